//! The controller half of the bridge.
//!
//! [`Orchestrator`] starts the engine thread, feeds it commands, and on every
//! [`tick`](Orchestrator::tick) pulls whatever the engine printed, looks for a best
//! move and applies it to the board it owns. Only the thread calling `tick` ever
//! touches the board.

use crate::board::{BoardSnapshot, BoardState, Move};
use crate::channel::CommandChannel;
use crate::config::BridgeConfig;
use crate::engine::{Engine, EngineIo};
use crate::error::{BridgeError, EngineError, FenError, MoveError};
use crate::messages::{self, Command};
use crate::sink::{self, BestMoveScanner, OutputSource, PendingMove};
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SHUTDOWN_POLL: Duration = Duration::from_millis(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BridgeState {
   Idle,
   EngineStarting,
   Ready,
   AwaitingMove,
   ShuttingDown,
   Stopped,
}

/// What a tick did with the engine's best move, if it had one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
   Idle,
   Applied(Move),
   Rejected { token: String, error: MoveError },
}

pub struct Orchestrator {
   config: BridgeConfig,
   state: BridgeState,
   board: BoardState,
   commands: CommandChannel,
   output: Option<OutputSource>,
   scanner: BestMoveScanner,
   pending: PendingMove,
   running: Arc<AtomicBool>,
   engine_thread: Option<JoinHandle<Result<(), EngineError>>>,
   started_at: Instant,
   readiness_sent: bool,
   status: String,
}

impl Orchestrator {
   /// Fails when `config.start_fen` does not parse.
   pub fn new(config: BridgeConfig) -> Result<Orchestrator, BridgeError> {
      let board = BoardState::from_fen(&config.start_fen)?;
      let scanner = BestMoveScanner::new(config.output_buffer_cap);
      Ok(Orchestrator {
         config,
         state: BridgeState::Idle,
         board,
         commands: CommandChannel::new(),
         output: None,
         scanner,
         pending: PendingMove::new(),
         running: Arc::new(AtomicBool::new(false)),
         engine_thread: None,
         started_at: Instant::now(),
         readiness_sent: false,
         status: String::new(),
      })
   }

   /// `new` followed by `start`.
   pub fn launch<E: Engine>(config: BridgeConfig, engine: E) -> Result<Orchestrator, BridgeError> {
      let mut orchestrator = Orchestrator::new(config)?;
      orchestrator.start(engine)?;
      Ok(orchestrator)
   }

   /// Spawns the engine thread with a fresh command channel, output channel and
   /// pending slot. Allowed from `Idle` and, to restart, from `Stopped`.
   pub fn start<E: Engine>(&mut self, mut engine: E) -> Result<(), BridgeError> {
      if !matches!(self.state, BridgeState::Idle | BridgeState::Stopped) {
         return Err(BridgeError::AlreadyRunning);
      }

      let (sink, source) = sink::output_channel(self.config.output_capacity);
      self.commands = CommandChannel::new();
      self.pending = PendingMove::new();
      self.scanner = BestMoveScanner::new(self.config.output_buffer_cap);
      self.running = Arc::new(AtomicBool::new(true));
      let io = EngineIo::new(self.commands.clone(), sink, self.running.clone());

      info!("initializing engine {}", engine.name());
      let handle = thread::Builder::new().name("uci-engine".into()).spawn(move || {
         debug!("engine thread started");
         let result = engine.run(&io);
         match &result {
            Ok(()) => debug!("engine loop finished"),
            Err(e) => error!("engine thread error: {}", e),
         }
         result
      });
      let handle = match handle {
         Ok(handle) => handle,
         Err(e) => {
            self.running.store(false, Ordering::Release);
            return Err(e.into());
         }
      };

      self.output = Some(source);
      self.engine_thread = Some(handle);
      self.started_at = Instant::now();
      self.readiness_sent = false;
      self.state = BridgeState::EngineStarting;
      Ok(())
   }

   /// One step of the controller: send the readiness check once the settle delay is
   /// over, pull engine output, then apply at most one best move.
   pub fn tick(&mut self) -> TickOutcome {
      self.send_readiness_check();
      self.drain_output();
      self.check_engine_thread();

      match self.pending.take() {
         Some(token) => self.apply_engine_move(token),
         None => TickOutcome::Idle,
      }
   }

   fn send_readiness_check(&mut self) {
      if self.state == BridgeState::EngineStarting
         && !self.readiness_sent
         && self.started_at.elapsed() >= self.config.settle_delay
      {
         debug!("sending isready");
         self.commands.send(Command::is_ready());
         self.readiness_sent = true;
      }
   }

   /// Feeds one batch of engine output through readiness and best move detection.
   /// Returns how many lines there were.
   fn drain_output(&mut self) -> usize {
      let lines = match &self.output {
         Some(output) => output.drain(),
         None => return 0,
      };
      let count = lines.len();
      for line in lines {
         trace!("engine: {}", line);
         if self.state == BridgeState::EngineStarting && messages::is_ready_ok(&line) {
            info!("engine is ready");
            self.state = BridgeState::Ready;
         }
         if let Some(best_move) = self.scanner.feed(&line) {
            self.pending.publish(best_move);
         }
      }
      count
   }

   fn check_engine_thread(&mut self) {
      let finished = self.engine_thread.as_ref().map_or(false, |x| x.is_finished());
      if !finished || !self.running.load(Ordering::Acquire) {
         return;
      }
      self.running.store(false, Ordering::Release);
      // whatever the engine wrote after this tick's drain is still queued
      while self.drain_output() > 0 {}
      let reason = match self.engine_thread.take().map(JoinHandle::join) {
         Some(Ok(Ok(()))) => "engine loop exited".to_owned(),
         Some(Ok(Err(e))) => e.to_string(),
         Some(Err(_)) | None => "engine thread panicked".to_owned(),
      };
      error!("engine stopped unexpectedly: {}", reason);
      self.status = format!("Engine stopped: {}", reason);
      self.output = None;
      self.state = BridgeState::Stopped;
   }

   fn apply_engine_move(&mut self, token: String) -> TickOutcome {
      if self.state == BridgeState::AwaitingMove {
         self.state = BridgeState::Ready;
      }
      match self.apply_move(&token) {
         Ok(a_move) => TickOutcome::Applied(a_move),
         Err(error) => TickOutcome::Rejected { token, error },
      }
   }

   pub fn is_running(&self) -> bool {
      self.engine_thread.is_some() && self.running.load(Ordering::Acquire)
   }

   /// Queues a raw protocol line for the engine.
   pub fn send_command(&mut self, text: impl Into<Command>) -> Result<(), BridgeError> {
      if !self.is_running() {
         warn!("dropping command, the engine is not running");
         return Err(BridgeError::NotRunning);
      }
      let command = text.into();
      self.status = format!("Sent: {}", command);
      self.commands.send(command);
      Ok(())
   }

   /// Asks the engine for its move in `fen`, thinking for `think_time`.
   pub fn request_move(&mut self, fen: &str, think_time: Duration) -> Result<(), BridgeError> {
      self.send_command(Command::position_fen(fen))?;
      self.send_command(Command::go_movetime(think_time))?;
      self.state = BridgeState::AwaitingMove;
      self.status = "Calculating move...".into();
      Ok(())
   }

   /// `request_move` for the position on our own board, using the configured think time.
   pub fn request_current_move(&mut self) -> Result<(), BridgeError> {
      let fen = self.board.fen().to_owned();
      self.request_move(&fen, self.config.think_time)
   }

   pub fn apply_move(&mut self, token: &str) -> Result<Move, MoveError> {
      match self.board.apply_move(token) {
         Ok(a_move) => {
            info!("applied move {}", token);
            debug!("new FEN: {}", self.board.fen());
            self.status = format!("Applied move: {}", token);
            Ok(a_move)
         }
         Err(e) => {
            warn!("invalid move {}: {}", token, e);
            self.status = format!("Invalid move: {}", token);
            Err(e)
         }
      }
   }

   pub fn reset(&mut self) {
      self.board.reset();
      info!("board reset to starting position");
      self.status = "Board reset to starting position".into();
   }

   pub fn set_position(&mut self, fen: &str) -> Result<(), FenError> {
      match self.board.set_position(fen) {
         Ok(()) => {
            self.status = format!("Position set: {}", self.board.fen());
            Ok(())
         }
         Err(e) => {
            warn!("rejected position {:?}: {}", fen, e);
            self.status = format!("Invalid position: {}", e);
            Err(e)
         }
      }
   }

   /// Stops the engine: clear the running flag, send `quit`, and wait up to the
   /// configured timeout for the thread. A thread that outlives the timeout is
   /// detached, and dropping our end of the output channel makes its next write fail.
   pub fn shutdown(&mut self) {
      if matches!(self.state, BridgeState::Idle | BridgeState::Stopped) {
         return;
      }
      self.state = BridgeState::ShuttingDown;
      self.running.store(false, Ordering::Release);
      self.commands.send(Command::quit());

      if let Some(handle) = self.engine_thread.take() {
         let deadline = Instant::now() + self.config.shutdown_timeout;
         while !handle.is_finished() && Instant::now() < deadline {
            if let Some(output) = &self.output {
               for line in output.drain() {
                  trace!("discarding engine output during shutdown: {}", line);
               }
            }
            thread::sleep(SHUTDOWN_POLL);
         }

         if handle.is_finished() {
            match handle.join() {
               Ok(Ok(())) => {}
               Ok(Err(e)) => warn!("engine stopped with an error: {}", e),
               Err(_) => error!("engine thread panicked"),
            }
         } else {
            error!(
               "engine thread did not stop within {:?}; detaching it",
               self.config.shutdown_timeout
            );
         }
      }

      self.output = None;
      self.pending.take();
      self.state = BridgeState::Stopped;
      info!("engine shutdown complete");
   }

   pub fn state(&self) -> BridgeState {
      self.state
   }

   pub fn board(&self) -> &BoardState {
      &self.board
   }

   pub fn snapshot(&self) -> BoardSnapshot {
      self.board.snapshot()
   }

   pub fn status(&self) -> &str {
      &self.status
   }

   pub fn config(&self) -> &BridgeConfig {
      &self.config
   }
}

impl Drop for Orchestrator {
   fn drop(&mut self) {
      self.shutdown();
   }
}

#[cfg(test)]
mod tests {
   use crate::board::START_FEN;
   use crate::bridge::*;
   use crate::engine::RandomEngine;
   use parking_lot::Mutex;

   /// Engine that records every command and answers from a fixed script keyed on
   /// the command's first word.
   struct ScriptedEngine {
      received: Arc<Mutex<Vec<String>>>,
      replies: Vec<(&'static str, Vec<&'static str>)>,
   }

   impl ScriptedEngine {
      fn new(replies: Vec<(&'static str, Vec<&'static str>)>) -> (ScriptedEngine, Arc<Mutex<Vec<String>>>) {
         let received = Arc::new(Mutex::new(Vec::new()));
         let engine = ScriptedEngine {
            received: received.clone(),
            replies,
         };
         (engine, received)
      }
   }

   impl Engine for ScriptedEngine {
      fn name(&self) -> &str {
         "scripted"
      }

      fn run(&mut self, io: &EngineIo) -> Result<(), EngineError> {
         while io.is_running() {
            let command = match io.read_line() {
               Some(command) => command,
               None => {
                  io.idle();
                  continue;
               }
            };
            self.received.lock().push(command.to_string());
            if command.is_quit() {
               return Ok(());
            }
            let verb = command.as_str().split_whitespace().next().unwrap_or("");
            for (trigger, lines) in &self.replies {
               if *trigger == verb {
                  for line in lines {
                     io.write(line)?;
                  }
               }
            }
         }
         Ok(())
      }
   }

   struct FailingEngine;

   impl Engine for FailingEngine {
      fn name(&self) -> &str {
         "failing"
      }

      fn run(&mut self, _io: &EngineIo) -> Result<(), EngineError> {
         Err(EngineError::Exited)
      }
   }

   /// Engine that prints its final lines and exits without waiting for commands.
   struct PartingEngine;

   impl Engine for PartingEngine {
      fn name(&self) -> &str {
         "parting"
      }

      fn run(&mut self, io: &EngineIo) -> Result<(), EngineError> {
         io.write("info depth 1")?;
         io.write("bestmove e2e4")?;
         Ok(())
      }
   }

   /// Engine that never looks at the running flag or its commands.
   struct StubbornEngine;

   impl Engine for StubbornEngine {
      fn name(&self) -> &str {
         "stubborn"
      }

      fn run(&mut self, _io: &EngineIo) -> Result<(), EngineError> {
         thread::sleep(Duration::from_millis(500));
         Ok(())
      }
   }

   fn fast_config() -> BridgeConfig {
      BridgeConfig {
         settle_delay: Duration::from_millis(0),
         shutdown_timeout: Duration::from_secs(2),
         think_time: Duration::from_millis(5),
         ..BridgeConfig::default()
      }
   }

   fn tick_until(orchestrator: &mut Orchestrator, mut done: impl FnMut(&Orchestrator, &TickOutcome) -> bool) -> TickOutcome {
      let deadline = Instant::now() + Duration::from_secs(5);
      loop {
         let outcome = orchestrator.tick();
         if done(orchestrator, &outcome) {
            return outcome;
         }
         assert!(Instant::now() < deadline, "timed out waiting, state {:?}", orchestrator.state());
         thread::sleep(Duration::from_millis(1));
      }
   }

   #[test]
   fn becomes_ready_after_readiness_round_trip() {
      let (engine, received) = ScriptedEngine::new(vec![("isready", vec!["readyok"])]);
      let mut orchestrator = Orchestrator::new(fast_config()).unwrap();
      assert_eq!(orchestrator.state(), BridgeState::Idle);
      orchestrator.start(engine).unwrap();
      assert_eq!(orchestrator.state(), BridgeState::EngineStarting);

      tick_until(&mut orchestrator, |o, _| o.state() == BridgeState::Ready);
      assert_eq!(received.lock().as_slice(), &["isready".to_owned()]);
   }

   #[test]
   fn waits_for_settle_delay_before_isready() {
      let (engine, received) = ScriptedEngine::new(vec![]);
      let config = BridgeConfig {
         settle_delay: Duration::from_secs(60),
         ..fast_config()
      };
      let mut orchestrator = Orchestrator::launch(config, engine).unwrap();
      orchestrator.tick();
      thread::sleep(Duration::from_millis(20));
      orchestrator.tick();
      assert!(received.lock().is_empty());
      assert_eq!(orchestrator.state(), BridgeState::EngineStarting);
   }

   #[test]
   fn request_move_sends_position_then_go() {
      let (engine, received) = ScriptedEngine::new(vec![]);
      let mut orchestrator = Orchestrator::launch(BridgeConfig::default(), engine).unwrap();
      orchestrator.request_move(START_FEN, Duration::from_millis(1000)).unwrap();
      assert_eq!(orchestrator.state(), BridgeState::AwaitingMove);
      assert_eq!(orchestrator.status(), "Calculating move...");

      let deadline = Instant::now() + Duration::from_secs(5);
      while received.lock().len() < 2 && Instant::now() < deadline {
         thread::sleep(Duration::from_millis(1));
      }
      assert_eq!(
         received.lock().as_slice(),
         &[format!("position fen {}", START_FEN), "go movetime 1000".to_owned()]
      );
   }

   #[test]
   fn applies_the_engine_best_move() {
      let (engine, _received) = ScriptedEngine::new(vec![
         ("isready", vec!["readyok"]),
         ("go", vec!["info depth 1 pv e2e4", "bestmove e2e4 ponder e7e5"]),
      ]);
      let mut orchestrator = Orchestrator::launch(fast_config(), engine).unwrap();
      tick_until(&mut orchestrator, |o, _| o.state() == BridgeState::Ready);

      orchestrator.request_current_move().unwrap();
      let outcome = tick_until(&mut orchestrator, |_, x| *x != TickOutcome::Idle);
      assert_eq!(outcome, TickOutcome::Applied("e2e4".parse().unwrap()));
      assert_eq!(orchestrator.state(), BridgeState::Ready);
      assert_eq!(
         orchestrator.board().fen(),
         "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
      );
      assert_eq!(orchestrator.status(), "Applied move: e2e4");
   }

   #[test]
   fn best_move_split_across_lines_is_applied() {
      let (engine, _received) = ScriptedEngine::new(vec![("go", vec!["bestmove", "g1f3"])]);
      let mut orchestrator = Orchestrator::launch(fast_config(), engine).unwrap();
      orchestrator.request_current_move().unwrap();
      let outcome = tick_until(&mut orchestrator, |_, x| *x != TickOutcome::Idle);
      assert_eq!(outcome, TickOutcome::Applied("g1f3".parse().unwrap()));
   }

   #[test]
   fn rejected_engine_move_leaves_board_alone() {
      let (engine, _received) = ScriptedEngine::new(vec![("go", vec!["bestmove e4e5"])]);
      let mut orchestrator = Orchestrator::launch(fast_config(), engine).unwrap();
      orchestrator.request_current_move().unwrap();
      let outcome = tick_until(&mut orchestrator, |_, x| *x != TickOutcome::Idle);
      assert_eq!(
         outcome,
         TickOutcome::Rejected {
            token: "e4e5".into(),
            error: MoveError::EmptySource("e4".into())
         }
      );
      assert_eq!(orchestrator.board(), &BoardState::start());
      assert_eq!(orchestrator.status(), "Invalid move: e4e5");
      assert_eq!(orchestrator.state(), BridgeState::Ready);
   }

   #[test]
   fn only_the_last_unconsumed_best_move_is_applied() {
      let mut orchestrator = Orchestrator::new(fast_config()).unwrap();
      orchestrator.pending.publish("e2e4".into());
      orchestrator.pending.publish("d2d4".into());
      assert_eq!(orchestrator.tick(), TickOutcome::Applied("d2d4".parse().unwrap()));
      assert_eq!(orchestrator.tick(), TickOutcome::Idle);
      assert!(orchestrator.board().square(52).piece().is_some());
      assert!(orchestrator.board().square(51).is_empty());
   }

   #[test]
   fn later_best_move_in_one_batch_wins() {
      let mut orchestrator = Orchestrator::new(fast_config()).unwrap();
      let (sink, source) = sink::output_channel(8);
      orchestrator.output = Some(source);
      sink.write("bestmove e2e4").unwrap();
      sink.write("info depth 2").unwrap();
      sink.write("bestmove d2d4").unwrap();
      assert_eq!(orchestrator.tick(), TickOutcome::Applied("d2d4".parse().unwrap()));
      assert_eq!(orchestrator.tick(), TickOutcome::Idle);
      assert!(orchestrator.board().square(52).piece().is_some());
      assert!(orchestrator.board().square(35).piece().is_some());
   }

   #[test]
   fn output_written_just_before_exit_is_kept() {
      let config = BridgeConfig {
         output_capacity: 4,
         ..fast_config()
      };
      let mut orchestrator = Orchestrator::launch(config, PartingEngine).unwrap();
      let deadline = Instant::now() + Duration::from_secs(5);
      while !orchestrator.engine_thread.as_ref().unwrap().is_finished() {
         assert!(Instant::now() < deadline);
         thread::sleep(Duration::from_millis(1));
      }

      // nothing was drained before the exit was noticed
      orchestrator.check_engine_thread();
      assert_eq!(orchestrator.state(), BridgeState::Stopped);
      assert_eq!(orchestrator.status(), "Engine stopped: engine loop exited");
      assert_eq!(orchestrator.tick(), TickOutcome::Applied("e2e4".parse().unwrap()));
   }

   #[test]
   fn starts_from_the_configured_position() {
      let fen = "4k3/8/8/8/8/8/4P3/4K3 b - - 0 1";
      let config = BridgeConfig {
         start_fen: fen.into(),
         ..fast_config()
      };
      let mut orchestrator = Orchestrator::new(config).unwrap();
      assert_eq!(orchestrator.board().fen(), fen);
      assert_eq!(orchestrator.board().active_color(), crate::board::Color::Black);
      orchestrator.reset();
      assert_eq!(orchestrator.board().fen(), START_FEN);
   }

   #[test]
   fn rejects_a_bad_starting_position() {
      let config = BridgeConfig {
         start_fen: "8/8/8 w - - 0 1".into(),
         ..fast_config()
      };
      assert!(matches!(
         Orchestrator::new(config),
         Err(BridgeError::StartPosition(FenError::RankCount(3)))
      ));
   }

   #[test]
   fn manual_moves_and_reset() {
      let mut orchestrator = Orchestrator::new(fast_config()).unwrap();
      assert!(orchestrator.apply_move("e2e4").is_ok());
      assert!(orchestrator.apply_move("z9z9").is_err());
      assert_eq!(orchestrator.status(), "Invalid move: z9z9");
      orchestrator.reset();
      assert_eq!(orchestrator.board(), &BoardState::start());
      assert_eq!(orchestrator.status(), "Board reset to starting position");
   }

   #[test]
   fn commands_need_a_running_engine() {
      let mut orchestrator = Orchestrator::new(fast_config()).unwrap();
      assert!(matches!(orchestrator.send_command("isready"), Err(BridgeError::NotRunning)));
      assert!(matches!(
         orchestrator.request_move(START_FEN, Duration::from_millis(10)),
         Err(BridgeError::NotRunning)
      ));
      assert_eq!(orchestrator.state(), BridgeState::Idle);
   }

   #[test]
   fn shutdown_sends_quit_and_joins() {
      let (engine, received) = ScriptedEngine::new(vec![]);
      let config = BridgeConfig {
         settle_delay: Duration::from_secs(60),
         ..fast_config()
      };
      let mut orchestrator = Orchestrator::launch(config, engine).unwrap();
      assert!(orchestrator.is_running());
      orchestrator.shutdown();
      assert_eq!(orchestrator.state(), BridgeState::Stopped);
      assert!(!orchestrator.is_running());
      assert!(matches!(orchestrator.send_command("isready"), Err(BridgeError::NotRunning)));
      // the engine may notice the cleared flag before it reads the quit
      assert!(received.lock().iter().all(|x| x == "quit"));
   }

   #[test]
   fn shutdown_detaches_a_stuck_engine() {
      let config = BridgeConfig {
         shutdown_timeout: Duration::from_millis(20),
         ..fast_config()
      };
      let mut orchestrator = Orchestrator::launch(config, StubbornEngine).unwrap();
      let started = Instant::now();
      orchestrator.shutdown();
      assert!(started.elapsed() < Duration::from_millis(400));
      assert_eq!(orchestrator.state(), BridgeState::Stopped);
   }

   #[test]
   fn engine_fault_is_reported_and_restart_works() {
      let mut orchestrator = Orchestrator::launch(fast_config(), FailingEngine).unwrap();
      tick_until(&mut orchestrator, |o, _| o.state() == BridgeState::Stopped);
      assert_eq!(orchestrator.status(), "Engine stopped: engine process closed its output");
      assert!(!orchestrator.is_running());

      let (engine, _received) = ScriptedEngine::new(vec![("isready", vec!["readyok"])]);
      orchestrator.start(engine).unwrap();
      tick_until(&mut orchestrator, |o, _| o.state() == BridgeState::Ready);
   }

   #[test]
   fn start_twice_is_refused() {
      let (engine, _) = ScriptedEngine::new(vec![]);
      let mut orchestrator = Orchestrator::launch(fast_config(), engine).unwrap();
      let (second, _) = ScriptedEngine::new(vec![]);
      assert!(matches!(orchestrator.start(second), Err(BridgeError::AlreadyRunning)));
   }

   #[test]
   fn plays_against_the_random_engine() {
      let mut orchestrator = Orchestrator::launch(fast_config(), RandomEngine::seeded(11)).unwrap();
      tick_until(&mut orchestrator, |o, _| o.state() == BridgeState::Ready);
      for _ in 0..4 {
         let side = orchestrator.board().active_color();
         orchestrator.request_current_move().unwrap();
         let outcome = tick_until(&mut orchestrator, |_, x| *x != TickOutcome::Idle);
         assert!(matches!(outcome, TickOutcome::Applied(_)), "got {:?}", outcome);
         assert_eq!(orchestrator.board().active_color(), !side);
      }
      orchestrator.shutdown();
      assert_eq!(orchestrator.state(), BridgeState::Stopped);
   }
}
