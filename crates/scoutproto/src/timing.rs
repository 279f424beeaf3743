//! Reply budgets per command.
//!
//! Queries are expected to be answered from the in-memory index; submissions
//! may wait on server-side persistence. The budgets are fixed per command and
//! not configurable per call.

use std::time::Duration;

use crate::frame::Command;

/// How long a query waits for its match description.
pub const QUERY_REPLY_TIMEOUT: Duration = Duration::from_millis(1000);

/// How long a submission waits for its assigned uid.
pub const SUBMIT_REPLY_TIMEOUT: Duration = Duration::from_millis(5000);

impl Command {
    /// Reply budget for this command.
    pub fn reply_timeout(&self) -> Duration {
        match self {
            Command::Query => QUERY_REPLY_TIMEOUT,
            Command::Submit => SUBMIT_REPLY_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_waits_one_second() {
        assert_eq!(Command::Query.reply_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn submit_waits_five_seconds() {
        assert_eq!(Command::Submit.reply_timeout(), Duration::from_secs(5));
    }
}
