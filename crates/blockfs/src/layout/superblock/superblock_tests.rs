use super::*;

fn geometry(block_size: u64, block_count: u64) -> Geometry {
    Geometry::new("test", block_size * block_count, block_size)
}

#[test]
fn plan_for_reference_volume() {
    let sb = Superblock::plan(&geometry(512, 2048)).expect("plan");
    assert_eq!(sb.num_inodes, 509);
    assert_eq!(sb.inode_start, 2);
    assert_eq!(sb.inode_blocks(), 144);
    assert_eq!(sb.bitmap_start, 146);
    assert_eq!(sb.bitmap_blocks(), 1);
    assert_eq!(sb.data_start, 147);
    assert_eq!(sb.total_data_blocks, 1901);
    assert_eq!(sb.free_blocks, sb.total_data_blocks);
    assert_eq!(sb.used_blocks, 0);
    assert_eq!(sb.level_capacity, [64, 4096]);
    assert_eq!(sb.max_file_blocks(), 10 + 64 + 4096);
}

#[test]
fn plan_rejects_unsupported_block_sizes() {
    for block_size in [0, 128, 255, 300] {
        let err = Superblock::plan(&geometry(block_size.max(1), 4096)).expect_err("bad size");
        assert!(matches!(err, FsError::InvalidGeometry(_)), "{block_size}");
    }
}

#[test]
fn plan_rejects_tiny_volumes() {
    let err = Superblock::plan(&geometry(512, 7)).expect_err("too small");
    assert!(matches!(err, FsError::InvalidGeometry(_)));
}

#[test]
fn smallest_volume_keeps_a_data_block() {
    let sb = Superblock::plan(&geometry(512, 8)).expect("plan");
    assert_eq!(sb.num_inodes, 2);
    assert_eq!(sb.data_start, 4);
    assert_eq!(sb.total_data_blocks, 4);
}

#[test]
fn bitmap_grows_with_large_data_regions() {
    let sb = Superblock::plan(&geometry(256, 1 << 16)).expect("plan");
    let bits = sb.bitmap_blocks() * 256 * 8;
    assert!(bits >= sb.total_data_blocks);
    assert!(bits - 256 * 8 < sb.total_data_blocks, "bitmap is not oversized");
    assert_eq!(sb.data_start + sb.total_data_blocks, 1 << 16);
}

#[test]
fn bitmap_sizing_settles_on_boundary() {
    // 2050 blocks with 2048 bits per block: one bitmap block would leave 2049 data blocks.
    assert_eq!(compute_bitmap_blocks(2050, 256).expect("fits"), (2, 2048));
    assert_eq!(compute_bitmap_blocks(2049, 256).expect("fits"), (1, 2048));
    assert!(compute_bitmap_blocks(1, 256).is_err());
}

#[test]
fn bytes_roundtrip_and_signatures() {
    let mut sb = Superblock::plan(&geometry(512, 2048)).expect("plan");
    sb.used_inodes = 3;
    sb.used_blocks = 5;
    sb.free_blocks -= 5;

    let mut buf = vec![0u8; 512];
    sb.write_bytes(&mut buf);
    assert_eq!(&buf[..8], &SUPER_SIGNATURE.to_le_bytes());
    assert_eq!(&buf[88..96], &SUPER_SIGNATURE_END.to_le_bytes());
    assert_eq!(Superblock::from_bytes(&buf), Some(sb));

    buf[95] ^= 0xFF;
    assert_eq!(Superblock::from_bytes(&buf), None, "trailing signature checked");
    assert_eq!(Superblock::from_bytes(&[0u8; 512]), None);
    assert_eq!(Superblock::from_bytes(&buf[..40]), None);
}

#[test]
fn validate_accepts_planned_layout_and_rejects_mismatches() {
    let g = geometry(512, 2048);
    let sb = Superblock::plan(&g).expect("plan");
    sb.validate(&g).expect("planned layout is valid");

    let smaller = geometry(512, 1024);
    assert!(matches!(sb.validate(&smaller), Err(FsError::Corrupt(_))));

    let other_block_size = Geometry {
        block_size: 1024,
        ..g.clone()
    };
    assert!(matches!(
        sb.validate(&other_block_size),
        Err(FsError::Corrupt(_))
    ));

    let mut shuffled = sb;
    shuffled.bitmap_start = shuffled.data_start + 1;
    assert!(shuffled.validate(&g).is_err());
}

#[test]
fn primes() {
    assert_eq!(prime_at_most(512), 509);
    assert_eq!(prime_at_most(509), 509);
    assert_eq!(prime_at_most(2), 2);
    assert_eq!(prime_at_most(1), 0);
    assert_eq!(prime_at_most(100), 97);
    assert!(!is_prime(511));
    assert!(is_prime(7919));
}
