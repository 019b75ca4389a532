use std::fmt::{Debug, Display, Formatter};

use super::Log;

impl<T: Display> Display for Log<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Log::None => Ok(()),
            Log::Default(s) | Log::Success(s) | Log::Result(s) | Log::Verbose(s) => {
                write!(f, "{}", s)
            }
        }
    }
}

impl<T> Log<T> {
    /// Order of the log level, used to decide whether a given trace point fires.
    pub fn order(&self) -> u8 {
        match self {
            Log::None => 0,
            Log::Default(_) => 1,
            Log::Success(_) => 2,
            Log::Result(_) => 3,
            Log::Verbose(_) => 4,
        }
    }
}

impl<TL: Display + Copy> Log<TL> {
    /// Trace a definition group dispatch: which group, at which position, and
    /// (on completion) which alternative was committed to.
    pub fn log_group_entry(&self, group: &str, position: usize) {
        #[cfg(debug_assertions)]
        if self.order() >= Log::Default(()).order() {
            println!("[{}; group] entering '{}' at {}", self, group, position);
        }
    }

    pub fn log_group_commit(&self, group: &str, position: usize, consumed: usize) {
        #[cfg(debug_assertions)]
        if self.order() >= Log::Success(()).order() {
            println!(
                "[{}; group] '{}' committed {} chars from {}",
                self, group, consumed, position
            );
        }
    }

    pub fn log_group_miss(&self, group: &str, position: usize) {
        #[cfg(debug_assertions)]
        if self.order() >= Log::Result(()).order() {
            println!("[{}; group] '{}' failed at {}", self, group, position);
        }
    }

    pub fn log_cache_hit(&self, group: &str, position: usize) {
        #[cfg(debug_assertions)]
        if self.order() >= Log::Verbose(()).order() {
            println!("[{}; cache] hit '{}' at {}", self, group, position);
        }
    }

    pub fn log_grow(&self, group: &str, position: usize, len: usize) {
        #[cfg(debug_assertions)]
        if self.order() >= Log::Success(()).order() {
            println!(
                "[{}; grow] '{}' seed at {} now spans {} chars",
                self, group, position, len
            );
        }
    }
}

impl<T: Debug> Log<T> {
    pub fn label(&self) -> Option<&T> {
        match self {
            Log::None => None,
            Log::Default(s) | Log::Success(s) | Log::Result(s) | Log::Verbose(s) => Some(s),
        }
    }
}
