//! Greedy (coordinate-prefix) routing
//!
//! Next-hop selection maximizes the shared coordinate prefix with the
//! destination, tie-breaking by proximity to the root (shorter coordinates)
//! and then by lower port id.

use arbor_switch::{Coordinates, PortId};

fn common_prefix_len(a: &[PortId], b: &[PortId]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// A routing candidate: a port id paired with that peer's last-known
/// coordinates (port 0 / the local node is a valid candidate too).
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub port: PortId,
    pub coords: &'a [PortId],
}

/// Pick the best next hop toward `destination` among `candidates`.
///
/// Returns `None` only when `candidates` is empty; callers are expected to
/// always include the local node (port 0) as a candidate so that "deliver
/// locally" is representable as a winning candidate rather than a special
/// case.
pub fn select_next_hop(candidates: &[Candidate<'_>], destination: &Coordinates) -> Option<PortId> {
    candidates
        .iter()
        .map(|c| {
            let prefix = common_prefix_len(c.coords, destination);
            (prefix, std::cmp::Reverse(c.coords.len()), std::cmp::Reverse(c.port), c.port)
        })
        .max_by_key(|&(prefix, shorter, lower_port, _)| (prefix, shorter, lower_port))
        .map(|(.., port)| port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_longest_shared_prefix() {
        let candidates = [
            Candidate { port: 1, coords: &[1] },
            Candidate { port: 2, coords: &[1, 2] },
        ];
        let dest = vec![1, 2, 3];
        assert_eq!(select_next_hop(&candidates, &dest), Some(2));
    }

    #[test]
    fn ties_break_toward_root_then_lower_port() {
        let candidates = [
            Candidate { port: 3, coords: &[1, 9] },
            Candidate { port: 1, coords: &[1] },
            Candidate { port: 2, coords: &[1] },
        ];
        let dest = vec![1, 2];
        // port 1 and port 2 share prefix len 1 with shorter coords than port 3;
        // lower port id (1) wins the final tie-break.
        assert_eq!(select_next_hop(&candidates, &dest), Some(1));
    }

    #[test]
    fn local_delivery_wins_when_closest() {
        let candidates = [
            Candidate { port: 0, coords: &[1, 2] },
            Candidate { port: 5, coords: &[1] },
        ];
        let dest = vec![1, 2];
        assert_eq!(select_next_hop(&candidates, &dest), Some(0));
    }

    #[test]
    fn empty_candidates_yields_none() {
        assert_eq!(select_next_hop(&[], &vec![1]), None);
    }
}
