//! Path resolution: splits a `/`-separated path and walks each component
//! through the directory iterator, assembling long filenames and matching
//! with DOS wildcards.

use esfat_ds::BlockDevice;
use zerocopy::FromBytes;

use crate::dir::{short_name_display, wildcard_match, LongNameBuilder, LongNameEntry, ShortEntry};
use crate::Volume;

/// A resolved directory entry: enough to open, stat, or unlink it.
#[derive(Debug, Clone)]
pub struct FoundEntry {
    pub cluster: u32,
    pub de_sector: u64,
    pub de_offset: usize,
    pub is_dir: bool,
    pub name: String,
    pub size: u32,
}

pub(crate) struct Search {
    pub found: Option<FoundEntry>,
    /// `0` if the path's final missing component's parent is also invalid
    /// (i.e. an earlier, non-terminal, component was not found).
    pub parent_dir_cluster: u32,
}

impl<DS: BlockDevice> Volume<DS> {
    /// Scans `dir_cluster` for an entry whose short or reassembled long
    /// name wildcard-matches `name`.
    pub(crate) fn dir_search(&self, dir_cluster: u32, name: &str) -> Option<FoundEntry> {
        let mut longname = LongNameBuilder::new();
        let mut longmatch = false;

        let (mut cursor, mut raw) = self.dir_cursor_first(dir_cluster);
        loop {
            let short = ShortEntry::ref_from_bytes(&raw).expect("32-byte slice matches layout");
            if short.is_end() {
                return None;
            }
            if short.is_free() {
                raw = self.dir_cursor_next(&mut cursor);
                continue;
            }

            if short.is_long_name() {
                let lde =
                    LongNameEntry::ref_from_bytes(&raw).expect("32-byte slice matches layout");
                longname.fold(lde);
                if LongNameBuilder::is_final_fragment(lde) {
                    longmatch = wildcard_match(name, &longname.as_str());
                }
            } else {
                let display = short_name_display(&short.name, &short.ext);
                let shortmatch = wildcard_match(name, &display);

                if display != "." && (shortmatch || longmatch) && !short.is_volume() {
                    let (de_sector, de_offset) = self.dir_cursor_location(&cursor);
                    return Some(FoundEntry {
                        cluster: short.cluster(),
                        de_sector,
                        de_offset,
                        is_dir: short.is_dir(),
                        name: if longmatch { longname.as_str() } else { display },
                        size: short.file_size.get(),
                    });
                }
                longmatch = false;
            }

            if cursor.exhausted() {
                return None;
            }
            raw = self.dir_cursor_next(&mut cursor);
        }
    }

    /// Resolves a `/`-separated path from the volume's root.
    pub(crate) fn search(&self, path: &str) -> Search {
        let mut parent = self.root_dir_cluster();
        let mut found = None;

        if path.is_empty() {
            return Search {
                found: None,
                parent_dir_cluster: 0,
            };
        }

        let mut rest = path;
        loop {
            let (component, tail) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i + 1..]),
                None => (rest, ""),
            };
            if component.is_empty() {
                return Search {
                    found: None,
                    parent_dir_cluster: 0,
                };
            }

            match self.dir_search(parent, component) {
                None => {
                    log::info!("{component} not found");
                    let has_more = !tail.is_empty() || rest.ends_with('/');
                    return Search {
                        found: None,
                        parent_dir_cluster: if has_more { 0 } else { parent },
                    };
                }
                Some(entry) => {
                    let is_last = tail.is_empty();
                    if !is_last {
                        if !entry.is_dir {
                            log::error!("{component} is not a directory");
                            return Search {
                                found: None,
                                parent_dir_cluster: parent,
                            };
                        }
                        parent = entry.cluster;
                        found = Some(entry);
                        rest = tail;
                        continue;
                    }
                    if rest.ends_with('/') && !entry.is_dir {
                        log::error!("{component} is not a directory but was given a trailing /");
                        return Search {
                            found: None,
                            parent_dir_cluster: parent,
                        };
                    }
                    found = Some(entry);
                    break;
                }
            }
        }

        Search {
            found,
            parent_dir_cluster: parent,
        }
    }
}
