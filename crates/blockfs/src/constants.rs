//! On-disk format constants shared by every layer of the volume.

/// Opens the superblock record.
pub const SUPER_SIGNATURE: u64 = 0x4461_6c65_4172_6d73;

/// Closes the superblock record; the byte-reversed twin of [`SUPER_SIGNATURE`].
pub const SUPER_SIGNATURE_END: u64 = 0x736d_7241_656c_6144;

/// Block holding the primary superblock.
pub const SUPERBLOCK_LBA: u64 = 0;

/// Block holding the superblock mirror.
pub const SUPERBLOCK_MIRROR_LBA: u64 = 1;

/// First block of the inode region.
pub const INODE_START_LBA: u64 = 2;

/// Width of every pointer and counter stored on disk.
pub const POINTER_SIZE: usize = 8;

/// Direct block pointers held by each inode.
pub const NUM_DIRECT: usize = 10;

/// Levels of indirection held by each inode (single, double).
pub const NUM_INDIRECT: usize = 2;

/// Number of u64 words in the superblock record.
pub const SUPERBLOCK_WORDS: usize = 10 + NUM_INDIRECT;

/// Serialized superblock length in bytes.
pub const SUPERBLOCK_SIZE: usize = SUPERBLOCK_WORDS * POINTER_SIZE;

/// Serialized inode record length in bytes.
pub const INODE_SIZE: usize = 144;

/// Volume blocks budgeted per inode when sizing the inode table.
pub const BLOCKS_PER_INODE: u64 = 4;

/// Seed of the inode slot hash.
pub const HASH_SEED: u64 = 7243;

/// Inode id of the root directory; never handed out by slot allocation.
pub const ROOT_INODE: u64 = 0;

/// Marks an inode record as allocated.
pub const USED_FLAG: u8 = 0xFF;

/// Marks an inode record as free.
pub const UNUSED_FLAG: u8 = 0;

/// Fixed width of the name field in a directory entry, NUL terminator included.
pub const NAME_FIELD_LEN: usize = 128;

/// Longest accepted entry name in bytes.
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;

/// Serialized directory entry length in bytes.
pub const DIR_ENTRY_SIZE: usize = POINTER_SIZE + NAME_FIELD_LEN;

/// Inode id stored in a free directory entry slot.
pub const FREE_ENTRY: u64 = 0;

/// Smallest supported block size.
pub const MIN_BLOCK_SIZE: u64 = 256;

/// Descriptors available in the open file table.
pub const MAX_OPEN_FILES: usize = 50;

/// Block size used when none is configured.
pub const DEFAULT_BLOCK_SIZE: u64 = 512;

/// Volume size used when none is configured (1 MiB).
pub const DEFAULT_VOLUME_SIZE: u64 = 1 << 20;
