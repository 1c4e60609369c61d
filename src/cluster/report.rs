//! Human-readable membership report

use std::cmp::Ordering;
use std::fmt::Write;
use std::sync::Arc;

use super::runtime::ClusterHandle;
use crate::error::BootstrapResult;
use crate::types::MemberRecord;

const LOCAL_MARKER: &str = " me -> ";
const REMOTE_MARKER: &str = "       ";

/// Total order over members: hostname, then IP text, then port, then unique id
pub fn member_order(a: &MemberRecord, b: &MemberRecord) -> Ordering {
    a.canonical_hostname
        .cmp(&b.canonical_hostname)
        .then_with(|| a.ip_address.to_string().cmp(&b.ip_address.to_string()))
        .then_with(|| a.port.cmp(&b.port))
        .then_with(|| a.unique_id.cmp(&b.unique_id))
}

/// Sort members in place by [`member_order`]
pub fn sort_members(members: &mut [MemberRecord]) {
    members.sort_by(member_order);
}

/// Render an already sorted member list
pub fn render(members: &[MemberRecord]) -> String {
    let mut output = String::new();
    for member in members {
        let marker = if member.is_local { LOCAL_MARKER } else { REMOTE_MARKER };
        // Writing to a String never fails
        let _ = writeln!(
            output,
            "{}{} ({}) : {} - {}",
            marker, member.canonical_hostname, member.ip_address, member.port, member.unique_id
        );
    }
    output
}

/// Reads live membership from a running cluster and renders it
#[derive(Clone)]
pub struct MembershipReporter {
    handle: Arc<dyn ClusterHandle>,
}

impl MembershipReporter {
    pub fn new(handle: Arc<dyn ClusterHandle>) -> Self {
        Self { handle }
    }

    pub fn report(&self) -> BootstrapResult<String> {
        let mut members = self.handle.members()?;
        sort_members(&mut members);
        Ok(render(&members))
    }
}
