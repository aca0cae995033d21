use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOptions {
    pub number_of_tries: i32,
    pub halt_on_failure: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::no_retries()
    }
}

impl RetryOptions {
    pub const fn new(number_of_tries: i32, halt_on_failure: bool) -> Self {
        Self {
            number_of_tries,
            halt_on_failure,
        }
    }

    pub const fn no_retries() -> Self {
        Self::new(1, true)
    }

    pub const fn until_failure() -> Self {
        Self::new(0, true)
    }

    pub fn unlimited_tries(&self) -> bool {
        self.number_of_tries < 1
    }

    pub fn has_retries(&self) -> bool {
        self.number_of_tries != 1
    }

    pub fn has_tries_left(&self, attempts: u32, successes: u32) -> bool {
        let has_failures = attempts != successes;
        let budget_left =
            self.unlimited_tries() || i64::from(attempts) < i64::from(self.number_of_tries);
        budget_left && !(has_failures && self.halt_on_failure)
    }

    pub fn tries_left(&self, attempts: u32) -> Option<i64> {
        if self.unlimited_tries() {
            None
        } else {
            Some(i64::from(self.number_of_tries) - i64::from(attempts))
        }
    }
}
