//! Cluster-chain allocator: linear free-cluster search, chain append/free,
//! and the multi-cluster allocation used by file create/write.

use esfat_ds::BlockDevice;

use crate::cluster::{Cluster, CLUST_FIRST};
use crate::Volume;

impl<DS: BlockDevice> Volume<DS> {
    /// Linearly scans the FAT from `max(start, 2)` for the first free
    /// cluster. Returns `0` if the volume is full.
    pub(crate) fn find_free(&self, start: u32) -> u32 {
        let begin = start.max(CLUST_FIRST);
        for cluster in begin..=self.geometry.num_clusters + 1 {
            if matches!(self.entry_get(cluster), Cluster::Free) {
                return cluster;
            }
        }
        0
    }

    /// Appends `new` to the chain ending at `tail`. `tail`'s entry must
    /// already be `EndOfChain`; `new`'s own entry must already be set
    /// before this call (normally `EndOfChain`, marking it the new tail).
    pub(crate) fn chain_append(&self, tail: u32, new: u32) {
        if !matches!(self.entry_get(tail), Cluster::EndOfChain) {
            log::error!("appending cluster {new} to {tail}, which is not a chain tail");
        }
        self.entry_set(tail, new);
    }

    /// Frees every cluster in the chain starting at `head`.
    pub(crate) fn chain_free(&self, head: u32) {
        let mut cluster = head;
        loop {
            let next = self.entry_get_checked(cluster);
            self.entry_set(cluster, 0);
            match next {
                Cluster::Data(n) => cluster = n,
                _ => break,
            }
        }
    }

    /// Allocates `ceil(size_bytes / bytes_per_cluster)` clusters, chaining
    /// them onto `start` (or starting a fresh chain if `start == 0`).
    /// Returns the first newly-allocated cluster, or `0` on exhaustion.
    ///
    /// On exhaustion, clusters already linked by this call before running
    /// out remain allocated: there is no rollback (see DESIGN.md).
    pub(crate) fn clusters_allocate(&self, start: u32, size_bytes: u32) -> u32 {
        if size_bytes == 0 {
            return 0;
        }
        let num = size_bytes.div_ceil(self.bytes_per_cluster());

        let mut first = 0u32;
        let mut tail = start;
        for _ in 0..num {
            let new = self.find_free(CLUST_FIRST);
            if new == 0 {
                log::error!(
                    "out of space allocating clusters; {first} cluster(s) already linked and leaked"
                );
                return 0;
            }
            self.entry_set_end_of_chain(new);
            if first == 0 {
                first = new;
            }
            if tail != 0 {
                self.chain_append(tail, new);
            }
            tail = new;
        }
        first
    }
}
