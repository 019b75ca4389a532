mod logger;
mod position;

use once_cell::unsync::OnceCell;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
/// Line/column location derived from a byte or char offset into the source text.
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// Lazily computed char-break index over the source text, used to translate a
/// stream position into a [`Position`] for error reporting.
pub struct Code<'c> {
    pub value: &'c [char],
    line_breaks: OnceCell<Vec<usize>>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// Debug-trace verbosity for the parser, ordered `None < Default < Success < Result < Verbose`.
pub enum Log<T> {
    None,
    Default(T),
    Success(T),
    Result(T),
    Verbose(T),
}
