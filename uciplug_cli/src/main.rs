mod console;
mod render;

use console::ConsoleCommand;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process;
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::Duration;
use structopt::StructOpt;
use uciplug_lib::bridge::{BridgeState, Orchestrator, TickOutcome};
use uciplug_lib::config::BridgeConfig;
use uciplug_lib::engine::{Engine, ProcessEngine, RandomEngine};
use uciplug_lib::messages::Command;

/// Drives a UCI chess engine from the console and keeps the board in sync with it
#[derive(StructOpt, Debug)]
#[structopt(name = "uciplug")]
struct Opt {
   /// UCI engine executable; the built-in random mover is used when absent
   #[structopt(short = "e", long = "engine", env = "UCIPLUG_ENGINE", parse(from_os_str))]
   engine: Option<PathBuf>,
   /// Think time for `go` without an argument, in milliseconds
   #[structopt(short = "m", long = "movetime", default_value = "1000")]
   movetime: u64,
   /// Delay before the engine is asked `isready`, in milliseconds
   #[structopt(long = "settle-ms", default_value = "500")]
   settle_ms: u64,
   /// How long to wait for the engine to stop on exit, in milliseconds
   #[structopt(long = "shutdown-timeout-ms", default_value = "1000")]
   shutdown_timeout_ms: u64,
   /// Controller tick interval, in milliseconds
   #[structopt(long = "tick-ms", default_value = "10")]
   tick_ms: u64,
   /// Print boards as JSON snapshots
   #[structopt(long = "json")]
   json: bool,
}

impl Opt {
   fn config(&self) -> BridgeConfig {
      BridgeConfig {
         settle_delay: Duration::from_millis(self.settle_ms),
         shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
         think_time: Duration::from_millis(self.movetime),
         ..BridgeConfig::default()
      }
   }

   fn engine(&self) -> Box<dyn Engine> {
      match &self.engine {
         Some(path) => Box::new(ProcessEngine::new(path.clone())),
         None => Box::new(RandomEngine::new()),
      }
   }
}

fn print_board(orchestrator: &Orchestrator, json: bool) {
   let snapshot = orchestrator.snapshot();
   if json {
      match render::board_json(&snapshot) {
         Ok(text) => println!("{}", text),
         Err(e) => error!("failed to serialize board: {}", e),
      }
   } else {
      println!("{}", render::board_text(&snapshot));
   }
}

/// Runs one console command. Returns false once the user asked to quit.
fn handle(orchestrator: &mut Orchestrator, command: ConsoleCommand, json: bool) -> bool {
   let sent = match command {
      ConsoleCommand::Go(think_time) => {
         let think_time = think_time.unwrap_or(orchestrator.config().think_time);
         let fen = orchestrator.board().fen().to_owned();
         orchestrator.request_move(&fen, think_time)
      }
      ConsoleCommand::Move(token) => {
         match orchestrator.apply_move(&token) {
            Ok(_) => print_board(orchestrator, json),
            Err(e) => eprintln!("{}", e),
         }
         Ok(())
      }
      ConsoleCommand::Reset => {
         orchestrator.reset();
         print_board(orchestrator, json);
         Ok(())
      }
      ConsoleCommand::Fen(fen) => {
         match orchestrator.set_position(&fen) {
            Ok(()) => print_board(orchestrator, json),
            Err(e) => eprintln!("{}", e),
         }
         Ok(())
      }
      ConsoleCommand::Board => {
         print_board(orchestrator, json);
         Ok(())
      }
      ConsoleCommand::Status => {
         println!("{:?}: {}", orchestrator.state(), orchestrator.status());
         Ok(())
      }
      ConsoleCommand::Send(raw) => orchestrator.send_command(raw),
      ConsoleCommand::Uci => orchestrator.send_command(Command::uci()),
      ConsoleCommand::NewGame => orchestrator.send_command(Command::new_game()),
      ConsoleCommand::Stop => orchestrator.send_command(Command::stop()),
      ConsoleCommand::Quit => return false,
   };
   if let Err(e) = sent {
      warn!("{}", e);
      eprintln!("{}", e);
   }
   true
}

fn main() {
   pretty_env_logger::init();
   let opt = Opt::from_args();

   let mut orchestrator = match Orchestrator::launch(opt.config(), opt.engine()) {
      Ok(orchestrator) => orchestrator,
      Err(e) => {
         error!("failed to start the engine bridge: {}", e);
         process::exit(1);
      }
   };

   let (console_tx, console_rx) = mpsc::channel();
   if let Err(e) = thread::Builder::new()
      .name("console".into())
      .spawn(move || console::read_loop(console_tx))
   {
      error!("failed to start the console reader: {}", e);
      orchestrator.shutdown();
      process::exit(1);
   }

   let tick = Duration::from_millis(opt.tick_ms);
   let mut input_closed = false;
   loop {
      match orchestrator.tick() {
         TickOutcome::Applied(a_move) => {
            println!("engine played {}", a_move);
            print_board(&orchestrator, opt.json);
         }
         TickOutcome::Rejected { token, error } => eprintln!("engine move {} rejected: {}", token, error),
         TickOutcome::Idle => {}
      }

      if input_closed {
         // let a pending request finish before leaving
         if orchestrator.state() != BridgeState::AwaitingMove {
            break;
         }
         thread::sleep(tick);
         continue;
      }

      match console_rx.try_recv() {
         Ok(line) => match console::parse(&line) {
            Ok(Some(command)) => {
               if !handle(&mut orchestrator, command, opt.json) {
                  break;
               }
            }
            Ok(None) => {}
            Err(e) => eprintln!("{}", e),
         },
         Err(TryRecvError::Empty) => thread::sleep(tick),
         Err(TryRecvError::Disconnected) => input_closed = true,
      }
   }

   info!("shutting down");
   orchestrator.shutdown();
}
