use crate::error::EngineError;
use log::{debug, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::{mpsc, Arc};

static BEST_MOVE: Lazy<Regex> =
   Lazy::new(|| Regex::new(r"bestmove\s+(\S{4,5})(?:\s+|$)").expect("best move pattern compiles"));

/// Creates the bounded line channel between the engine thread and the controller.
/// A zero capacity is raised to one line.
pub fn output_channel(capacity: usize) -> (OutputSink, OutputSource) {
   let capacity = capacity.max(1);
   let (sender, receiver) = mpsc::sync_channel(capacity);
   (OutputSink { sender }, OutputSource { receiver, capacity })
}

/// Engine side: one `write` per output line. Blocks while the channel is full.
#[derive(Clone, Debug)]
pub struct OutputSink {
   sender: mpsc::SyncSender<String>,
}

impl OutputSink {
   pub fn write(&self, line: &str) -> Result<(), EngineError> {
      self.sender.send(line.to_owned()).map_err(|_| EngineError::Disconnected)
   }
}

/// Controller side of the line channel.
#[derive(Debug)]
pub struct OutputSource {
   receiver: mpsc::Receiver<String>,
   capacity: usize,
}

impl OutputSource {
   /// Everything currently queued, capped at one channel's worth per call so a
   /// chatty engine cannot keep the controller in here forever.
   pub fn drain(&self) -> Vec<String> {
      self.receiver.try_iter().take(self.capacity).collect()
   }
}

/// Accumulates engine output until a complete `bestmove <token>` shows up.
///
/// Lines are trimmed and joined with a space, so a best move split over several
/// writes is still found. The buffer is emptied on every match. When it grows past
/// `cap` bytes the oldest text is thrown away.
#[derive(Debug)]
pub struct BestMoveScanner {
   buffer: String,
   cap: usize,
}

impl BestMoveScanner {
   pub fn new(cap: usize) -> BestMoveScanner {
      BestMoveScanner {
         buffer: String::new(),
         cap,
      }
   }

   pub fn feed(&mut self, line: &str) -> Option<String> {
      self.buffer.push_str(line.trim());
      self.buffer.push(' ');
      if self.buffer.len() > self.cap {
         self.discard_oldest();
      }

      let best_move = BEST_MOVE
         .captures(&self.buffer)
         .and_then(|x| x.get(1))
         .map(|x| x.as_str().to_owned())?;
      debug!("parsed best move {}", best_move);
      self.buffer.clear();
      Some(best_move)
   }

   pub fn buffered(&self) -> &str {
      &self.buffer
   }

   fn discard_oldest(&mut self) {
      let mut cut = self.buffer.len() - self.cap;
      while !self.buffer.is_char_boundary(cut) {
         cut += 1;
      }
      warn!(
         "engine output buffer passed {} bytes without a best move; dropping the oldest {} bytes",
         self.cap, cut
      );
      self.buffer.drain(..cut);
   }
}

/// Single-slot mailbox for the move the engine settled on. Not a queue: publishing
/// over an unconsumed move replaces it.
#[derive(Clone, Debug, Default)]
pub struct PendingMove {
   slot: Arc<Mutex<Option<String>>>,
}

impl PendingMove {
   pub fn new() -> PendingMove {
      PendingMove::default()
   }

   /// Stores `token`, returning the move it overwrote, if any.
   pub fn publish(&self, token: String) -> Option<String> {
      let replaced = self.slot.lock().replace(token);
      if let Some(dropped) = &replaced {
         warn!("best move {} was never applied; a newer one replaced it", dropped);
      }
      replaced
   }

   pub fn take(&self) -> Option<String> {
      self.slot.lock().take()
   }

   pub fn is_set(&self) -> bool {
      self.slot.lock().is_some()
   }
}
