// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! This module defines the `Error` struct and the `ErrorKind` enum, which are
//! used to represent errors that can occur in the library.

/// A macro for defining the `ErrorKind` enum, the `Display` implementation for
/// it, and the constructors for the `Error` struct.
macro_rules! ErrorKind {
    ($(
        ($kind:ident, $ctor:ident)
    ),*) => {
        /// The kind of error that occurred.
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum ErrorKind {
            $(
                $kind,
            )*
        }

        impl std::fmt::Display for ErrorKind {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        Self::$kind => write!(f, "{}", stringify!($kind)),
                    )*
                }
            }
        }

        /// Constructors for [`Error`].
        impl Error {
            $(
                #[doc = concat!(
                    "Creates a new [`Error`] with the `",
                    stringify!($kind),
                    "` kind and the given description."
                )]
                pub(crate) fn $ctor(desc: impl Into<String>) -> crate::Error {
                    Self {
                        kind: ErrorKind::$kind,
                        desc: desc.into(),
                        conflict: Vec::new(),
                    }
                }
            )*
        }
    };
}

ErrorKind!(
    (Cancelled, cancelled),
    (Internal, internal),
    (InvalidGraph, invalid_graph),
    (InvalidLink, invalid_link),
    (InvalidLocationType, invalid_location_type),
    (InvalidModel, invalid_model),
    (InvalidService, invalid_service),
    (LocationNotFound, location_not_found),
    (MasterInfeasible, master_infeasible),
    (MultipleOpposingLinks, multiple_opposing_links),
    (NoFeasiblePath, no_feasible_path),
    (Solver, solver)
);

/// An error that can occur while building topologies and service graphs, or
/// while optimising a placement.
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    desc: String,
    conflict: Vec<String>,
}

impl Error {
    /// Attaches the names of the constraints of an irreducible infeasible
    /// subsystem to the error.
    pub(crate) fn with_conflict(mut self, conflict: impl IntoIterator<Item = String>) -> Self {
        self.conflict = conflict.into_iter().collect();
        self
    }

    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the description of the error.
    pub fn description(&self) -> &str {
        &self.desc
    }

    /// Returns the constraint names that together make the master problem
    /// infeasible.
    ///
    /// Empty for every kind other than [`ErrorKind::MasterInfeasible`].
    pub fn conflict(&self) -> &[String] {
        &self.conflict
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.desc)?;
        if !self.conflict.is_empty() {
            write!(f, " [conflict: {}]", self.conflict.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::no_feasible_path("Service web has no path.");
        assert_eq!(err.kind(), ErrorKind::NoFeasiblePath);
        assert_eq!(err.to_string(), "NoFeasiblePath: Service web has no path.");

        let err = Error::master_infeasible("Master problem is infeasible.")
            .with_conflict(["replica_c1".to_string(), "node_capacity_n1_cpu".to_string()]);
        assert_eq!(err.conflict().len(), 2);
        assert_eq!(
            err.to_string(),
            concat!(
                "MasterInfeasible: Master problem is infeasible. ",
                "[conflict: replica_c1, node_capacity_n1_cpu]"
            )
        );
    }
}
