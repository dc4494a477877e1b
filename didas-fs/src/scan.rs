//! Read-only consistency check
//!
//! Allocation and chain linking are separate device writes, so an
//! interrupted operation can leave a block marked used that no chain
//! reaches. [`Partition::scan`] walks every chain from the root and compares
//! what it finds with the bitmap. Nothing is repaired.
use crate::error::{DfsError, DfsResult};
use crate::layout::{BlockId, ROOT_BLOCK};
use crate::partition::Partition;

/// Outcome of [`Partition::scan`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// blocks reached from the root
    pub reachable: u32,
    /// marked used but reached by no chain
    pub leaked: Vec<BlockId>,
    /// reached by a chain but marked free
    pub unmarked: Vec<BlockId>,
    /// reached more than once
    pub cross_linked: Vec<BlockId>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty() && self.unmarked.is_empty() && self.cross_linked.is_empty()
    }
}

impl Partition {
    pub fn scan(&self) -> DfsResult<ScanReport> {
        let count = self.block_count() as usize;
        let mut seen = Vec::new();
        seen.try_reserve_exact(count).map_err(|_| DfsError::Alloc)?;
        seen.resize(count, false);

        let mut report = ScanReport::default();
        let mut dirs = vec![ROOT_BLOCK];
        while let Some(dir) = dirs.pop() {
            if !self.mark_chain(dir, &mut seen, &mut report)? {
                continue;
            }
            let mut files = Vec::new();
            self.for_each_entry(dir, |entry| {
                if entry.is_dir() {
                    dirs.push(entry.first);
                } else {
                    files.push(entry.first);
                }
                Ok(true)
            })?;
            for file in files {
                self.mark_chain(file, &mut seen, &mut report)?;
            }
        }

        for block in 0..self.block_count() {
            let used = self.bitmap.get_used(block)?;
            match (seen[block as usize], used) {
                (true, false) => report.unmarked.push(block),
                (false, true) => report.leaked.push(block),
                _ => {}
            }
        }
        if !report.is_clean() {
            pt_warn!(
                self,
                "scan: {} leaked, {} unmarked, {} cross-linked",
                report.leaked.len(),
                report.unmarked.len(),
                report.cross_linked.len()
            );
        }
        Ok(report)
    }

    /// Mark the chain at `first` as seen. Returns false when its first block
    /// was already claimed, in which case the chain is not followed.
    fn mark_chain(
        &self,
        first: BlockId,
        seen: &mut [bool],
        report: &mut ScanReport,
    ) -> DfsResult<bool> {
        self.check_block(first)?;
        if seen[first as usize] {
            report.cross_linked.push(first);
            return Ok(false);
        }
        self.walk_chain(first, |block, _| {
            if seen[block as usize] {
                report.cross_linked.push(block);
            } else {
                seen[block as usize] = true;
                report.reachable += 1;
            }
            Ok(())
        })?;
        Ok(true)
    }
}
