//! Large-object placement tracker.
//!
//! A pure counting policy: it trusts the caller's declared size, never
//! inspects previously closed folders, and only ever moves forward to a
//! new folder. Folder and file identifiers are 1-based and monotonic.

/// Placement of one externalized large object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobPlacement {
    pub folder_id: u32,
    pub file_id: u32,
    pub size: u64,
}

/// Allocates `(folder_id, file_id)` locations under two configured
/// limits: maximum object count per folder and maximum cumulative bytes
/// per folder.
#[derive(Debug)]
pub struct LobTracker {
    max_per_folder: u32,
    max_folder_bytes: u64,
    folder_id: u32,
    in_folder: u32,
    folder_bytes: u64,
    next_file_id: u32,
    total: u64,
}

impl LobTracker {
    pub fn new(max_per_folder: u32, max_folder_bytes: u64) -> Self {
        Self {
            max_per_folder,
            max_folder_bytes,
            folder_id: 1,
            in_folder: 0,
            folder_bytes: 0,
            next_file_id: 1,
            total: 0,
        }
    }

    /// Allocate a location for an object of `size` bytes.
    ///
    /// Appends to the current folder if neither limit would be exceeded,
    /// otherwise rotates to a fresh folder. An object larger than the byte
    /// limit by itself still gets a folder of its own; allocation never
    /// refuses.
    pub fn allocate(&mut self, size: u64) -> LobPlacement {
        let count_ok = self.in_folder < self.max_per_folder;
        let size_ok = self.folder_bytes + size <= self.max_folder_bytes || self.in_folder == 0;
        if !(count_ok && size_ok) {
            self.folder_id += 1;
            self.in_folder = 0;
            self.folder_bytes = 0;
        }

        self.in_folder += 1;
        self.folder_bytes += size;
        self.total += 1;
        let placement = LobPlacement {
            folder_id: self.folder_id,
            file_id: self.next_file_id,
            size,
        };
        self.next_file_id += 1;
        placement
    }

    /// Total objects allocated so far.
    pub fn lob_count(&self) -> u64 {
        self.total
    }

    /// Number of folders opened so far (1 even before any allocation).
    pub fn folder_count(&self) -> u32 {
        self.folder_id
    }
}
