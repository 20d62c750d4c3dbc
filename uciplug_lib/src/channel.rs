use crate::messages::Command;
use log::trace;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// FIFO of commands from the controller to the engine thread.
///
/// Unbounded: `send` never waits. The engine side polls with `receive`, which never
/// blocks either and hands back `None` when nothing is queued.
#[derive(Clone, Debug, Default)]
pub struct CommandChannel {
   queue: Arc<Mutex<VecDeque<Command>>>,
}

impl CommandChannel {
   pub fn new() -> CommandChannel {
      CommandChannel::default()
   }

   pub fn send(&self, command: impl Into<Command>) {
      let command = command.into();
      trace!(">> {}", command);
      self.queue.lock().push_back(command);
   }

   pub fn receive(&self) -> Option<Command> {
      self.queue.lock().pop_front()
   }

   pub fn len(&self) -> usize {
      self.queue.lock().len()
   }

   pub fn is_empty(&self) -> bool {
      self.queue.lock().is_empty()
   }
}
