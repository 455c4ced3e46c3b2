//! Wire-format constants. The magics are pairwise distinct so a byte scan
//! can tell block kinds apart when resynchronising after corruption.

/// Leads every 512-byte file header.
pub const HEADER_MAGIC: u32 = 0x4952_5353;
/// Leads every data chunk.
pub const CHUNK_MAGIC: u32 = 0x9ABC_DEFF;
/// Leads the manifest block and doubles as its trailer sentinel.
pub const MANIFEST_MAGIC: u32 = 0x4D41_4E49;

pub const HEADER_SIZE: usize = 512;
pub const CHUNK_HEADER_SIZE: usize = 12;
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

pub const HEADER_VERSION: u32 = 1;
pub const MANIFEST_VERSION: u32 = 1;

/// Entry classification carried in the header and mirrored in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryKind {
    Regular = 0,
    Directory = 1,
    Symlink = 2,
}

impl EntryKind {
    pub fn from_wire(v: u8) -> Option<EntryKind> {
        match v {
            0 => Some(EntryKind::Regular),
            1 => Some(EntryKind::Directory),
            2 => Some(EntryKind::Symlink),
            _ => None,
        }
    }
}
