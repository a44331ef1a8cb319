use buddy_tree::PagePool;


fn main() {

    // A pool of 64 pages of 4 KiB, handing out at most 16 pages at once.
    let mut pool = PagePool::with_capacity(64, 4096, 16 * 4096).unwrap_or_else(
        |err| panic!("Invalid pool configuration: {}", err)
    );

    struct Header (u32, u32);

    let header = Header (0xcafe, 7);

    // Allocate enough pages for a small record and a larger payload.
    let record = pool.alloc(8)
        .unwrap_or_else(|err| panic!("Allocation failed with error {:?}", err));
    let payload = pool.alloc(10_000)
        .unwrap_or_else(|err| panic!("Allocation failed with error {:?}", err));

    // Write through the slices handed out by the pool.
    let bytes = pool.slice_mut(&record);
    bytes[..4].copy_from_slice(&header.0.to_le_bytes());
    bytes[4..].copy_from_slice(&header.1.to_le_bytes());
    pool.slice_mut(&payload).fill(0xff);

    println!(
        "record at page {}, payload at pages {:?}, {} bytes still free",
        record.block().offset,
        payload.block().range(),
        pool.free_bytes()
    );

    // Give the pages back.
    for block in [record, payload] {
        pool.free(block)
            .unwrap_or_else(|err| panic!("Failed to free block with error {:?}", err));
    }

}
