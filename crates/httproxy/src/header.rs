//! Ordered, case-insensitive header collection with tombstone removal.
//!
//! Mirrors a `ParsedHeader` array design, but borrows
//! names and values out of the request's backing buffer instead of
//! `strdup`-ing each field: every `Header` here is a pair of slices
//! into the buffer the worker read the request head into, so there is
//! no per-field allocation and no corresponding destroy walk. `set`
//! always appends at the end after removing any prior entry for the
//! same name, so repeated `set` calls are observably last-write-wins
//! *and* reorder the winning entry to the back.

const INITIAL_CAPACITY: usize = 8;

/// Headers that apply to a single transport hop and must never be
/// forwarded to the origin server.
const HOP_BY_HOP: [&str; 3] = ["connection", "proxy-connection", "keep-alive"];

#[derive(Debug, Clone, Copy)]
struct Entry<'a> {
    name: &'a str,
    value: &'a str,
}

/// An insertion-ordered sequence of headers, some of whose slots may be
/// tombstoned (logically removed but not compacted out). Borrows `'a`
/// from the buffer that owns the header bytes.
#[derive(Debug, Clone, Default)]
pub struct HeaderTable<'a> {
    entries: Vec<Option<Entry<'a>>>,
}

impl<'a> HeaderTable<'a> {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Removes any entry matching `name` (case-insensitively), then
    /// appends `(name, value)` as a new entry at the end.
    pub fn set(&mut self, name: &'a str, value: &'a str) {
        self.remove(name);
        self.entries.push(Some(Entry { name, value }));
    }

    /// Returns the value of the first non-tombstoned entry whose name
    /// matches `name` case-insensitively.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.live_entries()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.value)
    }

    /// Tombstones the entry matching `name`, if any. Returns whether an
    /// entry was found. The slot is left in place; no compaction.
    pub fn remove(&mut self, name: &str) -> bool {
        for slot in self.entries.iter_mut() {
            let matches = matches!(slot, Some(entry) if entry.name.eq_ignore_ascii_case(name));
            if matches {
                *slot = None;
                return true;
            }
        }
        false
    }

    fn live_entries(&self) -> impl Iterator<Item = Entry<'a>> + '_ {
        self.entries.iter().filter_map(|slot| *slot)
    }

    /// Entries eligible for the wire, in insertion order: non-tombstoned
    /// and not a hop-by-hop name.
    fn forwardable_entries(&self) -> impl Iterator<Item = Entry<'a>> + '_ {
        self.live_entries()
            .filter(|e| !HOP_BY_HOP.iter().any(|h| e.name.eq_ignore_ascii_case(h)))
    }

    /// Emits `name: value\r\n` for each forwardable entry in order,
    /// followed by a terminating `\r\n`.
    pub fn serialize(&self, out: &mut String) {
        for entry in self.forwardable_entries() {
            out.push_str(entry.name);
            out.push_str(": ");
            out.push_str(entry.value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
    }

    /// Exact byte count that `serialize` will write; never under-reports.
    pub fn serialized_length(&self) -> usize {
        let mut len = 2; // terminating CRLF
        for entry in self.forwardable_entries() {
            // "name: value\r\n"
            len += entry.name.len() + 2 + entry.value.len() + 2;
        }
        len
    }
}
