//! Suffix expansion for bare names.
//!
//! A lookup for a name below the `ndots` threshold walks the configured
//! suffix list, trying `name.suffix` for every suffix enabled in the query's
//! domain mask, with the untouched name tried first or last depending on the
//! dot count. Bit 0 of a mask stands for the as-is attempt, bit `i + 1` for
//! suffix `i`.

use crate::error::DnsError;

/// Hard cap on configured suffixes: masks are 32 bits wide and bit 0 is
/// taken by the as-is attempt.
pub(crate) const MAX_DOMAINS: usize = 31;

/// Cap on an expanded name, terminator included.
pub(crate) const MAX_DOMAIN_LEN: usize = 256;

pub(crate) fn dot_count(name: &str) -> usize {
    name.bytes().filter(|b| *b == b'.').count()
}

pub(crate) fn cat_domain(name: &str, suffix: &str) -> String {
    format!("{name}.{suffix}")
}

/// State of one expanded lookup, kept for the lifetime of the terminal query.
#[derive(Debug)]
pub(crate) struct SearchQuery {
    /// The bare name as the caller supplied it; never rewritten.
    name: String,
    /// Suffix bits, already shifted past the as-is bit.
    domain_mask: u32,
    /// As-is attempt still owed.
    try_as_is: bool,
    next_domain: usize,
    /// Current attempt is the untouched name.
    trying_as_is: bool,
    /// Outcome of the as-is attempt, surfaced if every suffix fails too.
    status_as_is: Option<DnsError>,
}

impl SearchQuery {
    pub fn new(name: String, mask: u32) -> Self {
        let try_as_is = mask & 1 != 0;
        Self {
            name,
            domain_mask: mask >> 1,
            try_as_is,
            next_domain: 0,
            trying_as_is: false,
            status_as_is: (!try_as_is).then_some(DnsError::NotFound),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next enabled suffix that keeps the expanded name within bounds.
    /// "None enabled" and "none fits" are indistinguishable on purpose.
    fn next_suffix(&mut self, domains: &[String]) -> Option<String> {
        let mut i = self.next_domain;
        while i < domains.len() {
            let enabled = self.domain_mask & (1 << i) != 0;
            if enabled && self.name.len() + domains[i].len() + 1 < MAX_DOMAIN_LEN {
                break;
            }
            i += 1;
        }

        self.next_domain = i + 1;
        domains.get(i).cloned()
    }

    /// Name of the first attempt, or `None` when the mask leaves nothing
    /// to try.
    pub fn first_target(&mut self, ndots: u32, domains: &[String]) -> Option<String> {
        if self.try_as_is && dot_count(&self.name) >= ndots as usize {
            self.trying_as_is = true;
            self.try_as_is = false;
            return Some(self.name.clone());
        }

        match self.next_suffix(domains) {
            Some(suffix) => {
                self.trying_as_is = false;
                Some(cat_domain(&self.name, &suffix))
            }
            None if self.try_as_is => {
                self.trying_as_is = true;
                self.try_as_is = false;
                Some(self.name.clone())
            }
            None => None,
        }
    }

    /// Consume a negative attempt outcome; the next name to try, or `None`
    /// once everything has been tried.
    pub fn advance(&mut self, status: DnsError, domains: &[String]) -> Option<String> {
        if self.trying_as_is {
            self.status_as_is = Some(status);
        }

        match self.next_suffix(domains) {
            Some(suffix) => {
                self.trying_as_is = false;
                Some(cat_domain(&self.name, &suffix))
            }
            None if self.try_as_is => {
                self.trying_as_is = true;
                self.try_as_is = false;
                Some(self.name.clone())
            }
            None => None,
        }
    }

    /// Status surfaced after the last attempt failed.
    pub fn final_status(&self, last: DnsError) -> DnsError {
        self.status_as_is.clone().unwrap_or(last)
    }
}

/// True for outcomes that move the search to its next candidate instead of
/// ending the query.
pub(crate) fn keeps_searching(status: &DnsError) -> bool {
    matches!(
        status,
        DnsError::NoData
            | DnsError::ServerFailure
            | DnsError::NotFound
            | DnsError::Refused
            | DnsError::EndOfServers
    )
}

/// Names a lookup may be answered under, in attempt order, paired with their
/// mask bits. Used to consult the cache before going to the network.
pub(crate) fn candidate_names(
    name: &str,
    domains: &[String],
    mask: u32,
    ndots: u32,
) -> Vec<(u32, String)> {
    let as_is = (mask & 1 != 0).then(|| (1u32, name.to_string()));

    if name.ends_with('.') || domains.is_empty() || mask == 1 {
        return as_is.into_iter().collect();
    }

    let mut out = Vec::new();
    let as_is_first = dot_count(name) >= ndots as usize;
    if as_is_first {
        out.extend(as_is.clone());
    }
    for (i, domain) in domains.iter().enumerate() {
        let bit = 1u32 << (i + 1);
        if mask & bit != 0 && name.len() + domain.len() + 1 < MAX_DOMAIN_LEN {
            out.push((bit, cat_domain(name, domain)));
        }
    }
    if !as_is_first {
        out.extend(as_is);
    }
    out
}
