//! Chain of CNAMEs observed in a single response.
//!
//! A denial for an aliased name may carry the CNAME records that lead to the
//! name the denial actually refers to. Walking the chain for the one member
//! that never appears as an owner yields that terminal name.
//!
//! Entries are packed back to back into one byte buffer:
//!
//! ```text
//! struct ChainEntry {
//!     is_owner: u8,
//!     size: u8,
//!     name: [u8; size + 1],   // NUL terminated
//! }
//! ```

const INLINE_BUF_LEN: usize = 512;

pub struct CnameChain {
    entries: usize,
    used: usize,
    cap: usize,
    inline: [u8; INLINE_BUF_LEN],
    /// Spill storage, active once the inline buffer overflows.
    heap: Option<Vec<u8>>,
}

impl Default for CnameChain {
    fn default() -> Self {
        Self {
            entries: 0,
            used: 0,
            cap: INLINE_BUF_LEN,
            inline: [0; INLINE_BUF_LEN],
            heap: None,
        }
    }
}

impl CnameChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    fn storage(&self) -> &[u8] {
        match &self.heap {
            Some(buf) => buf,
            None => &self.inline,
        }
    }

    fn storage_mut(&mut self) -> &mut [u8] {
        match &mut self.heap {
            Some(buf) => buf,
            None => &mut self.inline,
        }
    }

    /// Grow by doubling until `needed` more bytes fit. The inline buffer is
    /// left untouched once spilled.
    fn reserve(&mut self, needed: usize) {
        if self.used + needed <= self.cap {
            return;
        }
        let mut new_cap = self.cap;
        while self.used + needed > new_cap {
            new_cap <<= 1;
        }
        let mut new_buf = vec![0u8; new_cap];
        new_buf[..self.used].copy_from_slice(&self.storage()[..self.used]);
        self.heap = Some(new_buf);
        self.cap = new_cap;
    }

    /// Offset of the entry holding `name`, if present.
    fn find(&self, name: &str) -> Option<usize> {
        let buf = self.storage();
        let mut cur = 0;
        for _ in 0..self.entries {
            let size = buf[cur + 1] as usize;
            let entry_name = &buf[cur + 2..cur + 2 + size];
            if entry_name.eq_ignore_ascii_case(name.as_bytes()) {
                return Some(cur);
            }
            cur += size + 3;
        }
        None
    }

    fn push_entry(&mut self, name: &str, is_owner: bool) {
        debug_assert!(name.len() <= u8::MAX as usize);
        let bytes = name.as_bytes();
        let needed = bytes.len() + 3;
        self.reserve(needed);

        let used = self.used;
        let buf = self.storage_mut();
        buf[used] = is_owner as u8;
        buf[used + 1] = bytes.len() as u8;
        buf[used + 2..used + 2 + bytes.len()].copy_from_slice(bytes);
        buf[used + 2 + bytes.len()] = 0;

        self.used += needed;
        self.entries += 1;
    }

    /// Record one CNAME: the owner is marked (inserting it if absent) and the
    /// alias is inserted as a non-owner unless already present.
    pub fn add(&mut self, owner: &str, alias: &str) {
        match self.find(owner) {
            Some(offset) => self.storage_mut()[offset] = 1,
            None => self.push_entry(owner, true),
        }

        if self.find(alias).is_none() {
            self.push_entry(alias, false);
        }
    }

    /// The first name that never appeared as an owner, or `None` when every
    /// member owns some alias (a closed cycle).
    pub fn find_terminal(&self) -> Option<&str> {
        let buf = self.storage();
        let mut cur = 0;
        for _ in 0..self.entries {
            let size = buf[cur + 1] as usize;
            if buf[cur] == 0 {
                return std::str::from_utf8(&buf[cur + 2..cur + 2 + size]).ok();
            }
            cur += size + 3;
        }
        None
    }
}
