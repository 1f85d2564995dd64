//! NEVRA ordering.
//!
//! Version and release strings are compared with the RPM segment algorithm:
//! strings are split into runs of digits and runs of letters, separators are
//! skipped, numeric runs compare numerically and beat alphabetic runs, and
//! when one string runs out of segments the longer one is newer.
//! `~` sorts before anything (pre-releases), `^` sorts after the base
//! version but before any further segment.

use std::cmp::Ordering;

use super::Nevra;

/// Compare two version or release strings segment by segment.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let mut one = a.as_bytes();
    let mut two = b.as_bytes();

    loop {
        one = skip_separators(one);
        two = skip_separators(two);

        let one_tilde = one.first() == Some(&b'~');
        let two_tilde = two.first() == Some(&b'~');
        if one_tilde || two_tilde {
            if !one_tilde {
                return Ordering::Greater;
            }
            if !two_tilde {
                return Ordering::Less;
            }
            one = &one[1..];
            two = &two[1..];
            continue;
        }

        let one_caret = one.first() == Some(&b'^');
        let two_caret = two.first() == Some(&b'^');
        if one_caret || two_caret {
            if one.is_empty() {
                return Ordering::Less;
            }
            if two.is_empty() {
                return Ordering::Greater;
            }
            if !one_caret {
                return Ordering::Greater;
            }
            if !two_caret {
                return Ordering::Less;
            }
            one = &one[1..];
            two = &two[1..];
            continue;
        }

        if one.is_empty() || two.is_empty() {
            break;
        }

        let numeric = one[0].is_ascii_digit();
        let (seg1, rest1) = split_segment(one, numeric);
        let (seg2, rest2) = split_segment(two, numeric);

        // Segments of different kinds: numeric is newer.
        if seg2.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            compare_numeric(seg1, seg2)
        } else {
            seg1.cmp(seg2)
        };
        if ord != Ordering::Equal {
            return ord;
        }

        one = rest1;
        two = rest2;
    }

    match (one.is_empty(), two.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

fn skip_separators(s: &[u8]) -> &[u8] {
    let n = s
        .iter()
        .take_while(|c| !c.is_ascii_alphanumeric() && **c != b'~' && **c != b'^')
        .count();
    &s[n..]
}

fn split_segment(s: &[u8], numeric: bool) -> (&[u8], &[u8]) {
    let n = s
        .iter()
        .take_while(|c| {
            if numeric {
                c.is_ascii_digit()
            } else {
                c.is_ascii_alphabetic()
            }
        })
        .count();
    s.split_at(n)
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = trim_leading_zeros(a);
    let b = trim_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn trim_leading_zeros(s: &[u8]) -> &[u8] {
    let n = s.iter().take_while(|c| **c == b'0').count();
    &s[n..]
}

impl Nevra {
    /// Update-applicability order: epoch, version, release, then name.
    ///
    /// Architecture does not take part; two builds of the same EVR for
    /// different architectures compare equal here.
    pub fn cmp_evr_name(&self, other: &Nevra) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| rpmvercmp(&self.release, &other.release))
            .then_with(|| self.name.cmp(&other.name))
    }

    /// `-1`, `0` or `1` as [`Nevra::cmp_evr_name`] orders `self` against `other`.
    pub fn compare(&self, other: &Nevra) -> i32 {
        match self.cmp_evr_name(other) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    /// True when `other` is a newer build of the same package.
    pub fn is_updated_by(&self, other: &Nevra) -> bool {
        self.name == other.name && self.cmp_evr_name(other) == Ordering::Less
    }
}

impl Ord for Nevra {
    /// Total order used for sorting and dedup. Ties left by
    /// [`Nevra::cmp_evr_name`] are broken by arch and then by the raw
    /// version/release text so that the order agrees with `Eq`.
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_evr_name(other)
            .then_with(|| self.arch.cmp(&other.arch))
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.release.cmp(&other.release))
    }
}

impl PartialOrd for Nevra {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
