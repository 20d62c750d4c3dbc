use crate::error::{FenError, MoveError};
use serde::Serialize;
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
   White,
   Black,
}

impl Color {
   /// Colour class of a piece letter: uppercase is white, anything else black.
   pub fn of_letter(letter: char) -> Color {
      if letter.is_uppercase() {
         Color::White
      } else {
         Color::Black
      }
   }

   fn fen_symbol(self) -> &'static str {
      match self {
         Color::White => "w",
         Color::Black => "b",
      }
   }
}

impl std::ops::Not for Color {
   type Output = Color;
   fn not(self) -> Color {
      match self {
         Color::Black => Color::White,
         Color::White => Color::Black,
      }
   }
}

/// Contents of one square. Pieces are kept as their FEN letter, so anything the
/// engine or a FEN string hands us can be stored and written back unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Square {
   Empty,
   Piece(char),
}

impl Square {
   pub fn piece(self) -> Option<char> {
      match self {
         Square::Empty => None,
         Square::Piece(letter) => Some(letter),
      }
   }

   pub fn color(self) -> Option<Color> {
      self.piece().map(Color::of_letter)
   }

   pub fn is_empty(self) -> bool {
      self == Square::Empty
   }
}

/// A coordinate move in UCI form. Squares are array indices, a8 = 0 and h1 = 63.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Move {
   pub origin: usize,
   pub destination: usize,
   pub promotion: Option<char>,
}

impl fmt::Display for Move {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      write!(f, "{}{}", index_to_algebraic(self.origin), index_to_algebraic(self.destination))?;
      if let Some(promotion) = self.promotion {
         write!(f, "{}", promotion)?;
      }
      Ok(())
   }
}

impl FromStr for Move {
   type Err = MoveError;

   /// Checks the shape of the token only; whether the source square holds a
   /// piece is decided by [`BoardState::validate`].
   fn from_str(s: &str) -> Result<Move, MoveError> {
      let chars: SmallVec<[char; 5]> = s.chars().collect();
      if chars.len() != 4 && chars.len() != 5 {
         return Err(MoveError::BadLength(chars.len()));
      }
      let well_formed = chars[0].is_alphabetic()
         && chars[1].is_ascii_digit()
         && chars[2].is_alphabetic()
         && chars[3].is_ascii_digit()
         && chars.get(4).map_or(true, |c| c.is_alphabetic());
      if !well_formed {
         return Err(MoveError::BadFormat(s.to_owned()));
      }
      Ok(Move {
         origin: algebraic_to_index(chars[0], chars[1])?,
         destination: algebraic_to_index(chars[2], chars[3])?,
         promotion: chars.get(4).copied(),
      })
   }
}

fn index_to_algebraic(index: usize) -> String {
   let file = char::from(b'a' + (index % 8) as u8);
   let rank = char::from(b'8' - (index / 8) as u8);
   format!("{}{}", file, rank)
}

fn algebraic_to_index(file: char, rank: char) -> Result<usize, MoveError> {
   let col = match file {
      'a'..='h' => file as usize - 'a' as usize,
      _ => return Err(MoveError::OffBoard(format!("{}{}", file, rank))),
   };
   let row = match rank {
      '1'..='8' => '8' as usize - rank as usize,
      _ => return Err(MoveError::OffBoard(format!("{}{}", file, rank))),
   };
   Ok(row * 8 + col)
}

fn parse_layout(layout: &str) -> Result<[Square; 64], FenError> {
   let ranks: SmallVec<[&str; 8]> = layout.split('/').collect();
   if ranks.len() != 8 {
      return Err(FenError::RankCount(ranks.len()));
   }

   let mut squares = [Square::Empty; 64];
   for (row, rank) in ranks.iter().enumerate() {
      let mut file = 0;
      for letter in rank.chars() {
         match letter {
            '1'..='8' => file += letter as usize - '0' as usize,
            '0' | '9' => return Err(FenError::BadRun(letter)),
            _ => {
               if file < 8 {
                  squares[row * 8 + file] = Square::Piece(letter);
               }
               file += 1;
            }
         }
      }
      if file != 8 {
         return Err(FenError::RankWidth { rank: 8 - row, squares: file });
      }
   }
   Ok(squares)
}

/// The local copy of the game: 64 squares, the side to move and the FEN string
/// describing both. Only the board layout and active colour fields are maintained;
/// the remaining FEN fields are carried along as they were last seen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardState {
   squares: [Square; 64],
   active_color: Color,
   fen: String,
}

impl BoardState {
   pub fn start() -> BoardState {
      BoardState::from_fen(START_FEN).expect("starting FEN is well formed")
   }

   pub fn from_fen(fen: &str) -> Result<BoardState, FenError> {
      let fields: SmallVec<[&str; 6]> = fen.split_whitespace().collect();
      if fields.len() < 2 {
         return Err(FenError::MissingFields(fields.len()));
      }
      let squares = parse_layout(fields[0])?;
      let active_color = match fields[1] {
         "w" => Color::White,
         "b" => Color::Black,
         other => return Err(FenError::ActiveColor(other.to_owned())),
      };
      Ok(BoardState {
         squares,
         active_color,
         fen: fields.join(" "),
      })
   }

   /// Replaces the whole position. On error the current position is kept.
   pub fn set_position(&mut self, fen: &str) -> Result<(), FenError> {
      *self = BoardState::from_fen(fen)?;
      Ok(())
   }

   pub fn reset(&mut self) {
      *self = BoardState::start();
   }

   pub fn square(&self, index: usize) -> Square {
      self.squares[index]
   }

   pub fn squares(&self) -> &[Square; 64] {
      &self.squares
   }

   pub fn active_color(&self) -> Color {
      self.active_color
   }

   pub fn fen(&self) -> &str {
      &self.fen
   }

   /// Piece placement field regenerated from the squares, rank 8 first.
   pub fn board_fen(&self) -> String {
      let mut buf = String::with_capacity(71);
      for (row, rank) in self.squares.chunks(8).enumerate() {
         let mut empty_run: u8 = 0;
         for square in rank {
            match square {
               Square::Empty => empty_run += 1,
               Square::Piece(letter) => {
                  if empty_run > 0 {
                     buf.push(char::from(b'0' + empty_run));
                     empty_run = 0;
                  }
                  buf.push(*letter);
               }
            }
         }
         if empty_run > 0 {
            buf.push(char::from(b'0' + empty_run));
         }
         if row < 7 {
            buf.push('/');
         }
      }
      buf
   }

   /// Shape checks plus "there is something on the source square". Not a rules engine:
   /// destination, turn order and piece movement are not looked at.
   pub fn validate(&self, token: &str) -> Result<Move, MoveError> {
      let a_move: Move = token.parse()?;
      if self.squares[a_move.origin].is_empty() {
         return Err(MoveError::EmptySource(index_to_algebraic(a_move.origin)));
      }
      Ok(a_move)
   }

   pub fn is_valid(&self, token: &str) -> bool {
      self.validate(token).is_ok()
   }

   /// Moves whatever is on the source square to the destination, applies a promotion
   /// letter if present, then regenerates the FEN and passes the move to the other side.
   pub fn apply_move(&mut self, token: &str) -> Result<Move, MoveError> {
      let a_move = self.validate(token)?;
      let moving = self.squares[a_move.origin];
      self.squares[a_move.destination] = moving;
      self.squares[a_move.origin] = Square::Empty;

      if let Some(promotion) = a_move.promotion {
         // UCI always sends the promotion letter lowercase
         let promoted = match moving.color() {
            Some(Color::White) => promotion.to_ascii_uppercase(),
            _ => promotion.to_ascii_lowercase(),
         };
         self.squares[a_move.destination] = Square::Piece(promoted);
      }

      self.active_color = !self.active_color;
      self.regenerate_fen();
      Ok(a_move)
   }

   fn regenerate_fen(&mut self) {
      let carried: SmallVec<[&str; 4]> = self.fen.split_whitespace().skip(2).collect();
      let mut fen = self.board_fen();
      fen.push(' ');
      fen.push_str(self.active_color.fen_symbol());
      for field in carried {
         fen.push(' ');
         fen.push_str(field);
      }
      self.fen = fen;
   }

   pub fn snapshot(&self) -> BoardSnapshot {
      BoardSnapshot {
         squares: self.squares.iter().map(|x| x.piece()).collect(),
         colors: self
            .squares
            .iter()
            .map(|x| x.piece().map(Color::of_letter).unwrap_or(Color::Black))
            .collect(),
         active_color: self.active_color,
         fen: self.fen.clone(),
      }
   }
}

impl Default for BoardState {
   fn default() -> BoardState {
      BoardState::start()
   }
}

/// Read-only view handed to whatever draws the board. `colors` classifies every
/// square by letter case; empty squares fall in the lowercase class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BoardSnapshot {
   pub squares: Vec<Option<char>>,
   pub colors: Vec<Color>,
   pub active_color: Color,
   pub fen: String,
}
