use super::*;
use crate::constants::SUPERBLOCK_SIZE;
use crate::store::MemStore;
use crate::test_utils::{BLOCK_SIZE, FaultyStore, formatted, mem_store, sized_store};

fn block(store: &MemStore, lba: u64) -> &[u8] {
    let start = (lba * BLOCK_SIZE) as usize;
    &store.as_bytes()[start..start + BLOCK_SIZE as usize]
}

fn overwrite_superblocks(store: &mut MemStore, superblock: &Superblock) {
    let mut buf = vec![0u8; BLOCK_SIZE as usize];
    superblock.write_bytes(&mut buf);
    for lba in [SUPERBLOCK_LBA, SUPERBLOCK_MIRROR_LBA] {
        assert_eq!(store.write_blocks(&buf, 1, lba), 1);
    }
}

#[test]
fn format_reference_volume() {
    let volume = formatted();
    let sb = volume.superblock();
    assert_eq!(sb.num_inodes, 509);
    assert_eq!(sb.used_inodes, 1);
    assert_eq!(sb.used_blocks, 1);
    assert_eq!(sb.free_blocks, sb.total_data_blocks - 1);
    assert_eq!(sb.used_blocks + sb.free_blocks, sb.total_data_blocks);

    let root = volume.read_inode(ROOT_INODE).expect("root");
    assert!(root.used);
    assert_eq!(root.kind, InodeKind::Directory);
    assert_eq!(root.size, 0);
    assert_eq!(root.blocks_reserved, 1);
    assert_eq!(root.direct[0], 0);
    assert!(volume.is_block_allocated(0));
    assert!(!volume.is_block_allocated(1));
}

#[test]
fn format_writes_both_superblock_copies() {
    let volume = formatted();
    let sb = *volume.superblock();
    let store = volume.into_store();
    assert_eq!(
        block(&store, 0)[..SUPERBLOCK_SIZE],
        block(&store, 1)[..SUPERBLOCK_SIZE]
    );
    assert_eq!(Superblock::from_bytes(block(&store, 0)), Some(sb));
    assert_eq!(Volume::probe(&store).expect("probe"), Some(sb));
}

#[test]
fn format_rejects_bad_geometry() {
    let err = Volume::format(sized_store(128, 4096)).err().expect("block size");
    assert!(matches!(err, FsError::InvalidGeometry(_)));
    let err = Volume::format(sized_store(512, 6)).err().expect("too few blocks");
    assert!(matches!(err, FsError::InvalidGeometry(_)));
}

#[test]
fn format_clears_stale_metadata_but_not_data() {
    let mut store = mem_store();
    store.as_bytes_mut().fill(0xAA);
    let volume = Volume::format(store).expect("format");
    let sb = *volume.superblock();
    let store = volume.into_store();

    let inode_region = (sb.inode_start * BLOCK_SIZE) as usize..(sb.bitmap_start * BLOCK_SIZE) as usize;
    assert!(
        store.as_bytes()[inode_region]
            .iter()
            .enumerate()
            .all(|(i, &b)| i < 144 || b == 0),
        "only the root record is populated"
    );
    assert_eq!(block(&store, sb.bitmap_start)[0], 0b0000_0001);
    assert!(block(&store, sb.data_start).iter().all(|&b| b == 0), "root block zeroed");
    assert!(block(&store, sb.data_start + 1).iter().all(|&b| b == 0xAA));
}

#[test]
fn blank_volume_is_not_formatted() {
    let store = mem_store();
    assert_eq!(Volume::probe(&store).expect("probe"), None);
    assert!(matches!(Volume::mount(store), Err(FsError::NotFormatted)));
}

#[test]
fn mount_restores_layout_and_allocation() {
    let mut volume = formatted();
    assert_eq!(volume.allocate_block().expect("alloc"), 1);
    volume.persist_allocation().expect("persist");
    let sb = *volume.superblock();

    let volume = Volume::mount(volume.into_store()).expect("mount");
    assert_eq!(*volume.superblock(), sb);
    assert!(volume.is_block_allocated(1));
    assert_eq!(volume.superblock().used_blocks, 2);
}

#[test]
fn mount_recovers_primary_from_mirror() {
    let mut store = formatted().into_store();
    let bs = BLOCK_SIZE as usize;
    store.as_bytes_mut()[..bs].fill(0);

    let volume = Volume::mount(store).expect("mount from mirror");
    let sb = *volume.superblock();
    let store = volume.into_store();
    assert_eq!(Superblock::from_bytes(block(&store, 0)), Some(sb));
}

#[test]
fn mount_trusts_bitmap_over_counters() {
    let volume = formatted();
    let mut sb = *volume.superblock();
    let mut store = volume.into_store();
    sb.used_blocks = 7;
    sb.free_blocks = 3;
    overwrite_superblocks(&mut store, &sb);

    let volume = Volume::mount(store).expect("mount");
    assert_eq!(volume.superblock().used_blocks, 1);
    assert_eq!(
        volume.superblock().free_blocks,
        volume.superblock().total_data_blocks - 1
    );

    let store = volume.into_store();
    let persisted = Superblock::from_bytes(block(&store, 0)).expect("superblock");
    assert_eq!(persisted.used_blocks, 1, "reconciled counters are written back");
}

#[test]
fn mount_recounts_used_inodes() {
    let mut volume = formatted();
    let n = volume.superblock().num_inodes;
    for id in [5, 200, n - 1] {
        volume
            .write_inode(id, &Inode::new(id, ROOT_INODE, InodeKind::File, 0))
            .expect("write");
    }
    assert_eq!(volume.superblock().used_inodes, 1, "raw writes skip the counter");

    let volume = Volume::mount(volume.into_store()).expect("mount");
    assert_eq!(volume.superblock().used_inodes, 4);

    let store = volume.into_store();
    for lba in [SUPERBLOCK_LBA, SUPERBLOCK_MIRROR_LBA] {
        let persisted = Superblock::from_bytes(block(&store, lba)).expect("superblock");
        assert_eq!(persisted.used_inodes, 4, "lba {lba}");
    }
}

#[test]
fn mount_lowers_overstated_inode_count() {
    let volume = formatted();
    let mut sb = *volume.superblock();
    let mut store = volume.into_store();
    sb.used_inodes = sb.num_inodes;
    overwrite_superblocks(&mut store, &sb);

    let volume = Volume::mount(store).expect("mount");
    assert_eq!(volume.superblock().used_inodes, 1);
    assert!(volume.allocate_slot("fresh", ROOT_INODE).is_ok());
}

#[test]
fn mount_rejects_layout_larger_than_volume() {
    let store = formatted().into_store();
    let mut small = sized_store(BLOCK_SIZE, 1024);
    let head = 2 * BLOCK_SIZE as usize;
    small.as_bytes_mut()[..head].copy_from_slice(&store.as_bytes()[..head]);
    assert!(matches!(Volume::mount(small), Err(FsError::Corrupt(_))));
}

#[test]
fn storage_failures_propagate() {
    let mut store = FaultyStore::new(mem_store());
    store.fail_writes = true;
    let err = Volume::format(store).err().expect("short write");
    assert!(matches!(err, FsError::StorageIo { transferred, requested, .. } if transferred < requested));

    let mut store = FaultyStore::new(formatted().into_store());
    store.fail_reads = true;
    assert!(matches!(Volume::mount(store), Err(FsError::StorageIo { .. })));
}

#[test]
fn allocate_and_release_blocks() {
    let mut volume = formatted();
    let total = volume.superblock().total_data_blocks;
    assert_eq!(volume.allocate_block().expect("alloc"), 1);
    assert_eq!(volume.allocate_block().expect("alloc"), 2);

    assert!(volume.release_block(1).expect("release"));
    assert!(!volume.release_block(1).expect("double release is reported"));
    assert_eq!(volume.superblock().used_blocks, 2);
    assert_eq!(volume.superblock().free_blocks, total - 2);

    assert_eq!(volume.allocate_block().expect("alloc"), 1, "lowest free block first");
    assert!(matches!(volume.release_block(total), Err(FsError::Corrupt(_))));
}

#[test]
fn allocated_blocks_are_zero_filled() {
    let mut volume = formatted();
    let sb = *volume.superblock();
    let mut store = volume.into_store();
    let start = ((sb.data_start + 1) * BLOCK_SIZE) as usize;
    store.as_bytes_mut()[start..start + BLOCK_SIZE as usize].fill(0x55);

    volume = Volume::mount(store).expect("mount");
    let block_no = volume.allocate_block().expect("alloc");
    assert_eq!(block_no, 1);
    let store = volume.into_store();
    assert!(block(&store, sb.data_start + 1).iter().all(|&b| b == 0));
}

#[test]
fn exhausting_data_blocks_is_no_space() {
    let mut volume = Volume::format(sized_store(512, 8)).expect("format");
    assert_eq!(volume.superblock().total_data_blocks, 4);
    for _ in 0..3 {
        volume.allocate_block().expect("alloc");
    }
    assert_eq!(volume.allocate_block(), Err(FsError::NoSpace));
}

#[test]
fn reformat_discards_everything() {
    let mut volume = formatted();
    volume.allocate_block().expect("alloc");
    volume.allocate_block().expect("alloc");
    volume.persist_allocation().expect("persist");

    volume.reformat().expect("reformat");
    assert_eq!(volume.superblock().used_blocks, 1);
    assert!(!volume.is_block_allocated(1));

    let volume = Volume::mount(volume.into_store()).expect("mount");
    assert!(!volume.is_block_allocated(2));
}
