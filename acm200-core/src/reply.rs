//! Reply correlation
//!
//! The protocol carries no sequence numbers, so replies are matched to the
//! command in flight by content. A [`ReplyCollector`] is fed every reply line
//! that arrives while one command is outstanding and decides whether the line
//! belongs to it, completes it, or is stray (a late answer to an earlier,
//! timed-out request).

use acm200_types::ZoneId;

use crate::codec::{ReplyLine, ZoneStatus};
use crate::command::Command;
use crate::error::Error;

/// Complete answer to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Control command accepted
    Accepted,

    /// Zone states returned by a query
    Status(Vec<ZoneStatus>),
}

impl Reply {
    /// Zone states carried by the reply (empty for acknowledgements)
    pub fn statuses(&self) -> &[ZoneStatus] {
        match self {
            Self::Accepted => &[],
            Self::Status(statuses) => statuses,
        }
    }
}

/// Result of feeding one line to a collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collect {
    /// Line consumed, more expected
    Pending,

    /// Exchange finished
    Done(Result<Reply, Error>),

    /// Line does not belong to this command
    Stray(ReplyLine),
}

/// Accumulates reply lines for one in-flight command
#[derive(Debug)]
pub struct ReplyCollector {
    command: Command,
    echo: String,
    statuses: Vec<ZoneStatus>,
}

impl ReplyCollector {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            echo: command.to_string(),
            statuses: Vec::new(),
        }
    }

    /// Correlation key: the command's wire text
    pub fn key(&self) -> &str {
        &self.echo
    }

    /// Feed one reply line
    pub fn accept(&mut self, line: ReplyLine) -> Collect {
        match (self.command, line) {
            (_, ReplyLine::Err { echo, reason }) if echo == self.echo => {
                Collect::Done(Err(Error::Rejected {
                    command: echo,
                    reason: reason.unwrap_or_else(|| "no reason given".to_string()),
                }))
            }

            (Command::SetRoute { .. } | Command::SetPower { .. }, ReplyLine::Ok { echo })
                if echo == self.echo =>
            {
                Collect::Done(Ok(Reply::Accepted))
            }

            (Command::QueryZoneState(zone), ReplyLine::Status(status)) if status.zone == zone => {
                Collect::Done(Ok(Reply::Status(vec![status])))
            }

            (Command::QueryAllState, ReplyLine::Status(status)) => {
                self.push_status(status);
                Collect::Pending
            }

            (Command::QueryAllState, ReplyLine::End) => {
                Collect::Done(Ok(Reply::Status(std::mem::take(&mut self.statuses))))
            }

            (_, line) => Collect::Stray(line),
        }
    }

    fn push_status(&mut self, status: ZoneStatus) {
        // a repeated zone in one listing replaces the earlier line
        match self.statuses.iter_mut().find(|s| s.zone == status.zone) {
            Some(existing) => *existing = status,
            None => self.statuses.push(status),
        }
    }

    /// Zones collected so far
    pub fn zones(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.statuses.iter().map(|s| s.zone)
    }
}
