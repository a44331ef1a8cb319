use buddy_tree::BuddyTree;


fn main() {

    let mut tree = BuddyTree::create(64, 16).unwrap_or_else(
        |err| panic!("Invalid arena configuration: {}", err)
    );
    println!("{}", tree.dump());

    let first = tree.allocate(3).unwrap_or_else(|err| panic!("Allocation failed with error {:?}", err));
    println!("alloc offset:{}, level:{}\n{}", first.offset, first.level, tree.dump());

    let second = tree.allocate(1).unwrap_or_else(|err| panic!("Allocation failed with error {:?}", err));
    println!("alloc offset:{}, level:{}\n{}", second.offset, second.level, tree.dump());

    for block in [first, second] {
        tree.release(block.offset);
        println!("free offset:{}, level:{}\n{}", block.offset, block.level, tree.dump());
    }

}
