//! Version selection for one coordinate
//!
//! Policy: the highest explicitly requested concrete version wins; every
//! range request must accept the winner. With only ranges in play, the
//! highest available version satisfying all of them is chosen (so two
//! partially overlapping ranges resolve inside their intersection, and an
//! empty intersection is an unresolvable request set).

use super::{ComponentSource, Request, ResolverError, ResolverResult};
use semver::Version;
use trellis_model::{Coordinate, VersionSpec};

pub(crate) fn select_version<S: ComponentSource>(
    source: &S,
    coordinate: &Coordinate,
    requests: &[Request],
) -> ResolverResult<Version> {
    let winner = requests
        .iter()
        .filter_map(|request| request.spec.exact())
        .max();

    if let Some(winner) = winner {
        for request in requests {
            if let VersionSpec::Range(range) = &request.spec {
                if !range.matches(winner) {
                    return Err(ResolverError::unresolvable(coordinate, requests));
                }
            }
        }
        return Ok(winner.clone());
    }

    // Ranges only: highest available version inside the intersection.
    let mut available = source.available_versions(coordinate)?;
    available.sort();
    available
        .into_iter()
        .rev()
        .find(|version| requests.iter().all(|request| request.spec.matches(version)))
        .ok_or_else(|| ResolverError::unresolvable(coordinate, requests))
}
