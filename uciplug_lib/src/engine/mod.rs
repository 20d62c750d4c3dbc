//! The engine side of the bridge.
//!
//! An [`Engine`] runs on its own thread and talks to the controller only through
//! [`EngineIo`]: it polls for commands, writes output lines, and checks whether it
//! has been asked to stop.

pub mod process;
pub mod random;

pub use process::ProcessEngine;
pub use random::RandomEngine;

use crate::channel::CommandChannel;
use crate::error::EngineError;
use crate::messages::Command;
use crate::sink::OutputSink;
use log::trace;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Backoff between polls of an empty command channel.
pub const POLL_INTERVAL: Duration = Duration::from_millis(2);

pub trait Engine: Send + 'static {
   fn name(&self) -> &str;

   /// Runs the engine's command loop until `quit` or until `io` reports that the
   /// bridge is shutting down.
   fn run(&mut self, io: &EngineIo) -> Result<(), EngineError>;
}

impl Engine for Box<dyn Engine> {
   fn name(&self) -> &str {
      (**self).name()
   }

   fn run(&mut self, io: &EngineIo) -> Result<(), EngineError> {
      (**self).run(io)
   }
}

/// Everything an engine thread gets to see of the controller.
#[derive(Clone, Debug)]
pub struct EngineIo {
   commands: CommandChannel,
   output: OutputSink,
   running: Arc<AtomicBool>,
}

impl EngineIo {
   pub fn new(commands: CommandChannel, output: OutputSink, running: Arc<AtomicBool>) -> EngineIo {
      EngineIo {
         commands,
         output,
         running,
      }
   }

   /// Next queued command, or `None` right away if there is nothing to do.
   pub fn read_line(&self) -> Option<Command> {
      self.commands.receive()
   }

   pub fn write(&self, line: &str) -> Result<(), EngineError> {
      trace!("<< {}", line);
      self.output.write(line)
   }

   pub fn output(&self) -> OutputSink {
      self.output.clone()
   }

   /// Cleared by the controller when it shuts the bridge down.
   pub fn is_running(&self) -> bool {
      self.running.load(Ordering::Acquire)
   }

   pub fn idle(&self) {
      thread::sleep(POLL_INTERVAL);
   }
}
