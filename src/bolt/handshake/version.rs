//! Bolt protocol versions and the capabilities they imply.
//!
//! Every capability query is an exhaustive match over [`BoltVersion`] so that
//! adding a version forces a decision at each message-construction site.

use std::fmt;

/// Negotiated Bolt protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoltVersion {
    /// Bolt 3.0
    V3,
    /// Bolt 4.0
    V4_0,
    /// Bolt 4.1, routing context in HELLO
    V4_1,
    /// Bolt 4.2
    V4_2,
    /// Bolt 4.3, ROUTE message
    V4_3,
    /// Bolt 4.4, ROUTE with extra map, impersonation
    V4_4,
    /// Bolt 5.0
    V5_0,
    /// Bolt 5.1, LOGON/LOGOFF
    V5_1,
    /// Bolt 5.2, notification filters
    V5_2,
    /// Bolt 5.3, bolt_agent
    V5_3,
    /// Bolt 5.4
    V5_4,
}

/// Where credentials travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// Folded into the HELLO extra map.
    InHello,
    /// Separate LOGON after HELLO; LOGOFF/LOGON can rotate credentials.
    Logon,
}

/// How the routing table is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStyle {
    /// `CALL dbms.cluster.routing.getRoutingTable($context)`
    LegacyProcedure,
    /// `CALL dbms.routing.getRoutingTable($context, $database)`
    DatabaseProcedure,
    /// `ROUTE routing bookmarks db`
    RouteWithDatabase,
    /// `ROUTE routing bookmarks {db, imp_user}`
    RouteWithExtra,
}

/// How records are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStyle {
    /// PULL_ALL / DISCARD_ALL without fields
    All,
    /// PULL / DISCARD with `{n, qid}`
    Batched,
}

impl BoltVersion {
    /// Every supported version, newest first.
    pub const ALL: [BoltVersion; 11] = [
        BoltVersion::V5_4,
        BoltVersion::V5_3,
        BoltVersion::V5_2,
        BoltVersion::V5_1,
        BoltVersion::V5_0,
        BoltVersion::V4_4,
        BoltVersion::V4_3,
        BoltVersion::V4_2,
        BoltVersion::V4_1,
        BoltVersion::V4_0,
        BoltVersion::V3,
    ];

    /// Look up a version by its numbers.
    pub fn from_parts(major: u8, minor: u8) -> Option<Self> {
        match (major, minor) {
            (3, 0) => Some(BoltVersion::V3),
            (4, 0) => Some(BoltVersion::V4_0),
            (4, 1) => Some(BoltVersion::V4_1),
            (4, 2) => Some(BoltVersion::V4_2),
            (4, 3) => Some(BoltVersion::V4_3),
            (4, 4) => Some(BoltVersion::V4_4),
            (5, 0) => Some(BoltVersion::V5_0),
            (5, 1) => Some(BoltVersion::V5_1),
            (5, 2) => Some(BoltVersion::V5_2),
            (5, 3) => Some(BoltVersion::V5_3),
            (5, 4) => Some(BoltVersion::V5_4),
            _ => None,
        }
    }

    /// `(major, minor)`
    pub fn parts(self) -> (u8, u8) {
        match self {
            BoltVersion::V3 => (3, 0),
            BoltVersion::V4_0 => (4, 0),
            BoltVersion::V4_1 => (4, 1),
            BoltVersion::V4_2 => (4, 2),
            BoltVersion::V4_3 => (4, 3),
            BoltVersion::V4_4 => (4, 4),
            BoltVersion::V5_0 => (5, 0),
            BoltVersion::V5_1 => (5, 1),
            BoltVersion::V5_2 => (5, 2),
            BoltVersion::V5_3 => (5, 3),
            BoltVersion::V5_4 => (5, 4),
        }
    }

    /// Major version number.
    pub fn major(self) -> u8 {
        self.parts().0
    }

    /// Minor version number.
    pub fn minor(self) -> u8 {
        self.parts().1
    }

    /// Where credentials go.
    pub fn auth_style(self) -> AuthStyle {
        match self {
            BoltVersion::V3
            | BoltVersion::V4_0
            | BoltVersion::V4_1
            | BoltVersion::V4_2
            | BoltVersion::V4_3
            | BoltVersion::V4_4
            | BoltVersion::V5_0 => AuthStyle::InHello,
            BoltVersion::V5_1 | BoltVersion::V5_2 | BoltVersion::V5_3 | BoltVersion::V5_4 => {
                AuthStyle::Logon
            }
        }
    }

    /// How the routing table is fetched.
    pub fn route_style(self) -> RouteStyle {
        match self {
            BoltVersion::V3 => RouteStyle::LegacyProcedure,
            BoltVersion::V4_0 | BoltVersion::V4_1 | BoltVersion::V4_2 => {
                RouteStyle::DatabaseProcedure
            }
            BoltVersion::V4_3 => RouteStyle::RouteWithDatabase,
            BoltVersion::V4_4
            | BoltVersion::V5_0
            | BoltVersion::V5_1
            | BoltVersion::V5_2
            | BoltVersion::V5_3
            | BoltVersion::V5_4 => RouteStyle::RouteWithExtra,
        }
    }

    /// How records are pulled.
    pub fn pull_style(self) -> PullStyle {
        match self {
            BoltVersion::V3 => PullStyle::All,
            BoltVersion::V4_0
            | BoltVersion::V4_1
            | BoltVersion::V4_2
            | BoltVersion::V4_3
            | BoltVersion::V4_4
            | BoltVersion::V5_0
            | BoltVersion::V5_1
            | BoltVersion::V5_2
            | BoltVersion::V5_3
            | BoltVersion::V5_4 => PullStyle::Batched,
        }
    }

    /// HELLO accepts a `routing` context.
    pub fn supports_hello_routing(self) -> bool {
        match self {
            BoltVersion::V3 | BoltVersion::V4_0 => false,
            BoltVersion::V4_1
            | BoltVersion::V4_2
            | BoltVersion::V4_3
            | BoltVersion::V4_4
            | BoltVersion::V5_0
            | BoltVersion::V5_1
            | BoltVersion::V5_2
            | BoltVersion::V5_3
            | BoltVersion::V5_4 => true,
        }
    }

    /// HELLO should carry `patch_bolt: ["utc"]`.
    pub fn supports_utc_patch(self) -> bool {
        match self {
            BoltVersion::V4_3 | BoltVersion::V4_4 => true,
            BoltVersion::V3
            | BoltVersion::V4_0
            | BoltVersion::V4_1
            | BoltVersion::V4_2
            | BoltVersion::V5_0
            | BoltVersion::V5_1
            | BoltVersion::V5_2
            | BoltVersion::V5_3
            | BoltVersion::V5_4 => false,
        }
    }

    /// `imp_user` is accepted in BEGIN/RUN/ROUTE.
    pub fn supports_impersonation(self) -> bool {
        match self {
            BoltVersion::V3
            | BoltVersion::V4_0
            | BoltVersion::V4_1
            | BoltVersion::V4_2
            | BoltVersion::V4_3 => false,
            BoltVersion::V4_4
            | BoltVersion::V5_0
            | BoltVersion::V5_1
            | BoltVersion::V5_2
            | BoltVersion::V5_3
            | BoltVersion::V5_4 => true,
        }
    }

    /// `notifications_minimum_severity` / `notifications_disabled_categories`.
    pub fn supports_notification_filters(self) -> bool {
        match self {
            BoltVersion::V5_2 | BoltVersion::V5_3 | BoltVersion::V5_4 => true,
            BoltVersion::V3
            | BoltVersion::V4_0
            | BoltVersion::V4_1
            | BoltVersion::V4_2
            | BoltVersion::V4_3
            | BoltVersion::V4_4
            | BoltVersion::V5_0
            | BoltVersion::V5_1 => false,
        }
    }

    /// HELLO carries `bolt_agent`.
    pub fn supports_bolt_agent(self) -> bool {
        match self {
            BoltVersion::V5_3 | BoltVersion::V5_4 => true,
            BoltVersion::V3
            | BoltVersion::V4_0
            | BoltVersion::V4_1
            | BoltVersion::V4_2
            | BoltVersion::V4_3
            | BoltVersion::V4_4
            | BoltVersion::V5_0
            | BoltVersion::V5_1
            | BoltVersion::V5_2 => false,
        }
    }
}

impl fmt::Display for BoltVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor) = self.parts();
        write!(f, "{}.{}", major, minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_roundtrip() {
        for version in BoltVersion::ALL {
            let (major, minor) = version.parts();
            assert_eq!(BoltVersion::from_parts(major, minor), Some(version));
        }
        assert_eq!(BoltVersion::from_parts(6, 0), None);
        assert_eq!(BoltVersion::V4_3.to_string(), "4.3");
    }

    #[test]
    fn test_ordering() {
        assert!(BoltVersion::V5_1 > BoltVersion::V5_0);
        assert!(BoltVersion::V4_4 > BoltVersion::V3);
    }

    #[test]
    fn test_capability_matrix() {
        assert_eq!(BoltVersion::V5_0.auth_style(), AuthStyle::InHello);
        assert_eq!(BoltVersion::V5_1.auth_style(), AuthStyle::Logon);

        assert_eq!(BoltVersion::V3.route_style(), RouteStyle::LegacyProcedure);
        assert_eq!(BoltVersion::V4_2.route_style(), RouteStyle::DatabaseProcedure);
        assert_eq!(BoltVersion::V4_3.route_style(), RouteStyle::RouteWithDatabase);
        assert_eq!(BoltVersion::V5_4.route_style(), RouteStyle::RouteWithExtra);

        assert_eq!(BoltVersion::V3.pull_style(), PullStyle::All);
        assert_eq!(BoltVersion::V4_0.pull_style(), PullStyle::Batched);

        assert!(!BoltVersion::V4_0.supports_hello_routing());
        assert!(BoltVersion::V4_1.supports_hello_routing());
        assert!(BoltVersion::V4_4.supports_utc_patch());
        assert!(!BoltVersion::V5_0.supports_utc_patch());
        assert!(BoltVersion::V5_2.supports_notification_filters());
        assert!(!BoltVersion::V5_2.supports_bolt_agent());
        assert!(BoltVersion::V5_3.supports_bolt_agent());
    }
}
