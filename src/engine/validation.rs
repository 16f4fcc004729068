//! Connection validation for patch graphs.
//!
//! Checks that a proposed connection refers to live objects and existing
//! ports, is not already present, and respects port rates.

use thiserror::Error;

use super::object_class::PortKind;

/// Errors that can occur when attempting to connect two objects.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// One of the endpoints does not exist (or was removed).
    #[error("object does not exist")]
    MissingObject,
    /// Attempting to connect an object to itself.
    #[error("cannot connect an object to itself")]
    SelfConnection,
    /// The source object has no such outlet.
    #[error("outlet {outlet} out of range ({count} outlets)")]
    OutletOutOfRange { outlet: usize, count: usize },
    /// The sink object has no such inlet.
    #[error("inlet {inlet} out of range ({count} inlets)")]
    InletOutOfRange { inlet: usize, count: usize },
    /// Signal outlets cannot feed control inlets.
    #[error("cannot connect {} outlet to {} inlet", .from.name(), .to.name())]
    IncompatibleTypes { from: PortKind, to: PortKind },
    /// Connection already exists.
    #[error("connection already exists")]
    DuplicateConnection,
}

/// Validates whether an outlet of one kind may feed an inlet of another.
pub fn validate_port_kinds(from: PortKind, to: PortKind) -> Result<(), ConnectionError> {
    if from.can_connect_to(to) {
        Ok(())
    } else {
        Err(ConnectionError::IncompatibleTypes { from, to })
    }
}

/// Validates the port indices of a connection against the endpoint's port
/// lists, then the port kinds.
pub fn validate_ports(
    outlets: &[PortKind],
    outlet: usize,
    inlets: &[PortKind],
    inlet: usize,
) -> Result<(), ConnectionError> {
    let from = *outlets.get(outlet).ok_or(ConnectionError::OutletOutOfRange {
        outlet,
        count: outlets.len(),
    })?;
    let to = *inlets.get(inlet).ok_or(ConnectionError::InletOutOfRange {
        inlet,
        count: inlets.len(),
    })?;
    validate_port_kinds(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_rules() {
        assert!(validate_port_kinds(PortKind::Control, PortKind::Control).is_ok());
        assert!(validate_port_kinds(PortKind::Control, PortKind::Signal).is_ok());
        assert!(validate_port_kinds(PortKind::Signal, PortKind::Signal).is_ok());
        assert_eq!(
            validate_port_kinds(PortKind::Signal, PortKind::Control),
            Err(ConnectionError::IncompatibleTypes {
                from: PortKind::Signal,
                to: PortKind::Control,
            })
        );
    }

    #[test]
    fn test_port_ranges() {
        let outlets = [PortKind::Signal];
        let inlets = [PortKind::Signal, PortKind::Control];

        assert!(validate_ports(&outlets, 0, &inlets, 0).is_ok());
        assert_eq!(
            validate_ports(&outlets, 1, &inlets, 0),
            Err(ConnectionError::OutletOutOfRange { outlet: 1, count: 1 })
        );
        assert_eq!(
            validate_ports(&outlets, 0, &inlets, 5),
            Err(ConnectionError::InletOutOfRange { inlet: 5, count: 2 })
        );
        assert!(validate_ports(&outlets, 0, &inlets, 1).is_err());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ConnectionError::IncompatibleTypes {
                from: PortKind::Signal,
                to: PortKind::Control,
            }
            .to_string(),
            "cannot connect signal outlet to control inlet"
        );
        assert_eq!(
            ConnectionError::DuplicateConnection.to_string(),
            "connection already exists"
        );
    }
}
