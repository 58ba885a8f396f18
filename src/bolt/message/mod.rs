//! Bolt protocol message types.
//!
//! Requests are built by the driver per negotiated version; this module only
//! knows how to turn them into structures and back.

pub mod request;
pub mod response;

pub use request::BoltRequest;
pub use response::BoltResponse;

/// Message signature bytes.
pub mod tag {
    /// HELLO (0x01)
    pub const HELLO: u8 = 0x01;
    /// GOODBYE (0x02)
    pub const GOODBYE: u8 = 0x02;
    /// RESET (0x0F)
    pub const RESET: u8 = 0x0F;
    /// RUN (0x10)
    pub const RUN: u8 = 0x10;
    /// BEGIN (0x11)
    pub const BEGIN: u8 = 0x11;
    /// COMMIT (0x12)
    pub const COMMIT: u8 = 0x12;
    /// ROLLBACK (0x13)
    pub const ROLLBACK: u8 = 0x13;
    /// DISCARD / DISCARD_ALL (0x2F)
    pub const DISCARD: u8 = 0x2F;
    /// PULL / PULL_ALL (0x3F)
    pub const PULL: u8 = 0x3F;
    /// ROUTE (0x66), Bolt 4.3+
    pub const ROUTE: u8 = 0x66;
    /// LOGON (0x6A), Bolt 5.1+
    pub const LOGON: u8 = 0x6A;
    /// LOGOFF (0x6B), Bolt 5.1+
    pub const LOGOFF: u8 = 0x6B;

    /// SUCCESS (0x70)
    pub const SUCCESS: u8 = 0x70;
    /// RECORD (0x71)
    pub const RECORD: u8 = 0x71;
    /// IGNORED (0x7E)
    pub const IGNORED: u8 = 0x7E;
    /// FAILURE (0x7F)
    pub const FAILURE: u8 = 0x7F;
}

/// Request category, independent of version-specific field layout.
///
/// Server state transitions are keyed on this rather than on the request
/// itself so that PULL and PULL_ALL (or the two ROUTE shapes) behave alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// HELLO
    Hello,
    /// LOGON
    Logon,
    /// LOGOFF
    Logoff,
    /// GOODBYE
    Goodbye,
    /// RESET
    Reset,
    /// RUN
    Run,
    /// PULL or PULL_ALL
    Pull,
    /// DISCARD or DISCARD_ALL
    Discard,
    /// BEGIN
    Begin,
    /// COMMIT
    Commit,
    /// ROLLBACK
    Rollback,
    /// ROUTE
    Route,
}

impl MessageKind {
    /// Protocol name of the message.
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::Hello => "HELLO",
            MessageKind::Logon => "LOGON",
            MessageKind::Logoff => "LOGOFF",
            MessageKind::Goodbye => "GOODBYE",
            MessageKind::Reset => "RESET",
            MessageKind::Run => "RUN",
            MessageKind::Pull => "PULL",
            MessageKind::Discard => "DISCARD",
            MessageKind::Begin => "BEGIN",
            MessageKind::Commit => "COMMIT",
            MessageKind::Rollback => "ROLLBACK",
            MessageKind::Route => "ROUTE",
        }
    }

    /// Whether the server answers this message at all.
    pub fn expects_response(&self) -> bool {
        !matches!(self, MessageKind::Goodbye)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
