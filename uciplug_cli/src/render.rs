use uciplug_lib::board::{BoardSnapshot, Color};

/// Plain text diagram, rank 8 at the top.
pub fn board_text(snapshot: &BoardSnapshot) -> String {
   let mut out = String::with_capacity(256);
   for (rank_index, rank) in snapshot.squares.chunks(8).enumerate() {
      out.push_str(&format!("{} ", 8 - rank_index));
      for square in rank {
         out.push(' ');
         out.push(square.unwrap_or('.'));
      }
      out.push('\n');
   }
   out.push_str("   a b c d e f g h\n");
   let side = match snapshot.active_color {
      Color::White => "white",
      Color::Black => "black",
   };
   out.push_str(&format!("{} to move\n{}", side, snapshot.fen));
   out
}

pub fn board_json(snapshot: &BoardSnapshot) -> Result<String, serde_json::Error> {
   serde_json::to_string(snapshot)
}
