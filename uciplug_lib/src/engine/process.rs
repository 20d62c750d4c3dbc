use crate::engine::{Engine, EngineIo, POLL_INTERVAL};
use crate::error::EngineError;
use crate::sink::OutputSink;
use log::{debug, error, info, warn};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Runs an external UCI executable as a child process. Commands are forwarded to its
/// stdin as they are polled; its stdout is relayed line by line by a reader thread.
pub struct ProcessEngine {
   program: PathBuf,
   args: Vec<String>,
   name: String,
}

impl ProcessEngine {
   pub fn new(program: impl Into<PathBuf>) -> ProcessEngine {
      let program = program.into();
      let name = program.display().to_string();
      ProcessEngine {
         program,
         args: Vec::new(),
         name,
      }
   }

   pub fn arg(mut self, arg: impl Into<String>) -> ProcessEngine {
      self.args.push(arg.into());
      self
   }

   fn spawn(&self) -> Result<Child, EngineError> {
      Command::new(&self.program)
         .args(&self.args)
         .stdin(Stdio::piped())
         .stdout(Stdio::piped())
         .stderr(Stdio::inherit())
         .spawn()
         .map_err(|source| EngineError::Spawn {
            program: self.name.clone(),
            source,
         })
   }

   /// Forwards commands until `quit` has been written or the bridge shuts down.
   fn pump(
      &self,
      io: &EngineIo,
      stdin: &mut ChildStdin,
      reader: &JoinHandle<Result<(), EngineError>>,
   ) -> Result<(), EngineError> {
      loop {
         if !io.is_running() {
            // pass on whatever was queued during shutdown, normally the quit
            while let Some(command) = io.read_line() {
               writeln!(stdin, "{}", command)?;
            }
            stdin.flush()?;
            return Ok(());
         }
         if reader.is_finished() {
            return Err(EngineError::Exited);
         }
         match io.read_line() {
            Some(command) => {
               writeln!(stdin, "{}", command)?;
               stdin.flush()?;
               if command.is_quit() {
                  return Ok(());
               }
            }
            None => io.idle(),
         }
      }
   }

   /// Gives the child a moment to exit on its own, then kills it.
   fn reap(&self, child: &mut Child) {
      let deadline = Instant::now() + EXIT_GRACE;
      loop {
         match child.try_wait() {
            Ok(Some(status)) => {
               debug!("{} exited with {}", self.name, status);
               return;
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            Ok(None) => {
               warn!("{} did not exit after quit, killing it", self.name);
               if let Err(e) = child.kill() {
                  error!("failed to kill {}: {}", self.name, e);
               }
               let _ = child.wait();
               return;
            }
            Err(e) => {
               error!("failed to wait for {}: {}", self.name, e);
               return;
            }
         }
      }
   }
}

fn relay(stdout: ChildStdout, output: OutputSink) -> Result<(), EngineError> {
   for line in BufReader::new(stdout).lines() {
      output.write(&line?)?;
   }
   Ok(())
}

impl Engine for ProcessEngine {
   fn name(&self) -> &str {
      &self.name
   }

   fn run(&mut self, io: &EngineIo) -> Result<(), EngineError> {
      let mut child = self.spawn()?;
      info!("started engine process {} (pid {})", self.name, child.id());

      let stdout = child.stdout.take().ok_or(EngineError::MissingPipe("stdout"))?;
      let mut stdin = match child.stdin.take() {
         Some(stdin) => stdin,
         None => {
            self.reap(&mut child);
            return Err(EngineError::MissingPipe("stdin"));
         }
      };

      let output = io.output();
      let reader = thread::Builder::new()
         .name("uci-engine-stdout".into())
         .spawn(move || relay(stdout, output))?;

      let result = self.pump(io, &mut stdin, &reader);
      drop(stdin);
      self.reap(&mut child);

      match reader.join() {
         Ok(Ok(())) => {}
         Ok(Err(EngineError::Disconnected)) => debug!("stopped relaying {} output", self.name),
         Ok(Err(e)) => warn!("reading {} output failed: {}", self.name, e),
         Err(_) => error!("output reader for {} panicked", self.name),
      }
      result
   }
}
