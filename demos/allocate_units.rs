use buddy_tree::BuddyTree;


fn main() {

    // Create an arena of 1024 units where a single allocation may claim at most 64 units.
    let mut tree = BuddyTree::create(1024, 64).unwrap_or_else(
        |err| panic!("Invalid arena configuration: {}", err)
    );

    let units_to_alloc: usize = 24;

    // Allocate a block. The request is rounded up to 32 units.
    let block = tree.allocate(units_to_alloc).unwrap_or_else(
        |err| panic!("Allocation failed with error {:?}", err)
    );

    println!("allocated units {:?} ({} units)", block.range(), block.size());

    // Do stuff with the units...

    // Release the block. Its offset is all the tree needs.
    tree.release(block.offset);

    // The checked variant refuses blocks that are not currently allocated.
    if let Err(err) = tree.try_release(block) {
        println!("second release refused: {}", err);
    }

}
