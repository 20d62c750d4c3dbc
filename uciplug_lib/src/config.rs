use crate::board::START_FEN;
use std::time::Duration;

/// Knobs for the engine bridge. `Default` matches what the CLI uses without flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
   /// How long after starting the engine thread before `isready` is sent.
   pub settle_delay: Duration,
   /// Bounded wait for the engine thread to stop during shutdown.
   pub shutdown_timeout: Duration,
   /// Think time used when a caller does not pick one.
   pub think_time: Duration,
   /// Engine output lines that can be queued before the engine thread blocks.
   pub output_capacity: usize,
   /// Bytes of unmatched engine output kept while looking for a best move.
   pub output_buffer_cap: usize,
   /// Position the board starts from. `reset` always goes back to the standard one.
   pub start_fen: String,
}

impl Default for BridgeConfig {
   fn default() -> BridgeConfig {
      BridgeConfig {
         settle_delay: Duration::from_millis(500),
         shutdown_timeout: Duration::from_millis(1000),
         think_time: Duration::from_millis(1000),
         output_capacity: 1024,
         output_buffer_cap: 64 * 1024,
         start_fen: START_FEN.to_owned(),
      }
   }
}
