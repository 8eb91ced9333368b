//! Which match fields of an installed rule stay exact

use crate::openflow::wildcards::*;
use crate::openflow::OfMatch;
use crate::services::SwitchAttributes;

/// Fields kept exact on every hop: mobility detection and per-MAC stats
/// depend on them.
const ALWAYS_EXACT: u32 = IN_PORT | DL_VLAN | DL_SRC | DL_DST | DL_TYPE;

const L3_EXACT: u32 = DL_TYPE | NW_SRC_MASK | NW_DST_MASK;

/// Wildcard mask for a rule on a switch with `attrs`.
///
/// Edge hops of a non-tunneled flow always match L3 exactly; interior
/// tunnel hops never have to.
pub fn wildcard_mask(
    attrs: &SwitchAttributes,
    hint: Option<u32>,
    tunnel_enabled: bool,
    first_or_last_hop: bool,
) -> u32 {
    let mut w = hint.unwrap_or(ALL);
    w &= !ALWAYS_EXACT;
    if attrs.requires_l3_match {
        w &= !L3_EXACT;
    }
    w &= attrs.fast_wildcards;
    if !tunnel_enabled && first_or_last_hop {
        w &= !L3_EXACT;
    }
    w
}

pub fn wildcard(
    of_match: OfMatch,
    attrs: &SwitchAttributes,
    hint: Option<u32>,
    tunnel_enabled: bool,
    first_or_last_hop: bool,
) -> OfMatch {
    of_match.with_wildcards(wildcard_mask(attrs, hint, tunnel_enabled, first_or_last_hop))
}
