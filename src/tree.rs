//! Binary search tree over the positions of the sliding window.
//! This is used by the `window` module to find the longest match for the
//! look-ahead buffer.  Nodes live in a flat array of `W+1` slots with
//! 16-bit links, so there are no ownership cycles to manage: slot `i`
//! stands for the substring starting at window position `i`, and slot `W`
//! is a sentinel whose `larger` child is the real root.  The byte
//! comparisons that order the tree happen in the `window` module; this
//! module only does link surgery.

/// marks an absent parent or child link
pub const UNUSED: u16 = u16::MAX;

/// which child of a node to follow
#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum Side {
    Smaller,
    Larger
}

#[derive(Clone,Copy,PartialEq,Eq,Debug)]
struct Node {
    parent: u16,
    smaller: u16,
    larger: u16
}

const FREE: Node = Node { parent: UNUSED, smaller: UNUSED, larger: UNUSED };

pub struct MatchTree {
    nodes: Vec<Node>,
    /// index of the sentinel, equal to the window size
    sentinel: usize
}

impl MatchTree {
    pub fn create(window_size: usize) -> Self {
        Self {
            nodes: vec![FREE; window_size + 1],
            sentinel: window_size
        }
    }
    /// the root of the active tree, or UNUSED when empty
    pub fn root(&self) -> u16 {
        self.nodes[self.sentinel].larger
    }
    /// Clear every node and attach `first` as the sole child of the
    /// sentinel.  Called when the first byte enters the window.
    pub fn seed(&mut self, first: u16) {
        for node in self.nodes.iter_mut() {
            *node = FREE;
        }
        self.nodes[self.sentinel].larger = first;
        self.nodes[first as usize].parent = self.sentinel as u16;
    }
    pub fn is_linked(&self, index: u16) -> bool {
        self.nodes[index as usize].parent != UNUSED
    }
    pub fn child(&self, index: u16, side: Side) -> u16 {
        match side {
            Side::Smaller => self.nodes[index as usize].smaller,
            Side::Larger => self.nodes[index as usize].larger
        }
    }
    /// Attach the detached node `index` as the given child of `parent`.
    pub fn attach(&mut self, parent: u16, side: Side, index: u16) {
        debug_assert!(!self.is_linked(index));
        debug_assert!(self.child(parent,side) == UNUSED);
        match side {
            Side::Smaller => self.nodes[parent as usize].smaller = index,
            Side::Larger => self.nodes[parent as usize].larger = index
        }
        self.nodes[index as usize] = Node {
            parent,
            smaller: UNUSED,
            larger: UNUSED
        };
    }
    /// Splice out a node with at most one child; the child (which may be
    /// UNUSED) inherits the parent link.
    fn contract(&mut self, old: u16, new: u16) {
        let parent = self.nodes[old as usize].parent as usize;
        debug_assert!(new == UNUSED || self.nodes[new as usize].parent == old);
        if new != UNUSED {
            self.nodes[new as usize].parent = parent as u16;
        }
        if self.nodes[parent].larger == old {
            self.nodes[parent].larger = new;
        } else {
            self.nodes[parent].smaller = new;
        }
        self.nodes[old as usize].parent = UNUSED;
    }
    /// Graft the detached node `new` into the links of `old`, which is
    /// unlinked in the process.
    pub fn replace(&mut self, old: u16, new: u16) {
        debug_assert!(old != new);
        debug_assert!(!self.is_linked(new));
        let parent = self.nodes[old as usize].parent as usize;
        if parent != UNUSED as usize {
            if self.nodes[parent].smaller == old {
                self.nodes[parent].smaller = new;
            } else {
                self.nodes[parent].larger = new;
            }
        }
        self.nodes[new as usize] = self.nodes[old as usize];
        let Node { smaller, larger, .. } = self.nodes[new as usize];
        if smaller != UNUSED {
            self.nodes[smaller as usize].parent = new;
        }
        if larger != UNUSED {
            self.nodes[larger as usize].parent = new;
        }
        self.nodes[old as usize].parent = UNUSED;
    }
    /// Delete a node, keeping the rest of the tree intact.  Unlinked
    /// nodes are ignored.  A node with two children is substituted by its
    /// in-order predecessor, the rightmost node of its left subtree.
    pub fn delete(&mut self, index: u16) {
        let node = self.nodes[index as usize];
        if node.parent == UNUSED {
            return;
        }
        if node.smaller != UNUSED && node.larger != UNUSED {
            let mut pred = node.smaller;
            while self.nodes[pred as usize].larger != UNUSED {
                pred = self.nodes[pred as usize].larger;
            }
            // the predecessor has no larger child, so this recursion
            // bottoms out in a contract
            self.delete(pred);
            self.replace(index,pred);
        } else if node.smaller != UNUSED {
            self.contract(index,node.smaller);
        } else {
            self.contract(index,node.larger);
        }
    }
    /// Re-map every node after the data buffer was compacted by `shift`
    /// bytes of window slide.  The node array is rotated so that slot `i`
    /// once again describes window position `i`, then every stored link
    /// is shifted by the same amount.  The sentinel slot and UNUSED links
    /// stay put.
    pub fn reindex(&mut self, shift: usize) {
        let w = self.sentinel;
        rotate_left(&mut self.nodes[0..w],shift);
        let wrap = |link: u16| ((link as usize + w - shift) % w) as u16;
        for node in self.nodes.iter_mut() {
            if node.parent != UNUSED && node.parent as usize != w {
                node.parent = wrap(node.parent);
            }
            if node.smaller != UNUSED {
                node.smaller = wrap(node.smaller);
            }
            if node.larger != UNUSED {
                node.larger = wrap(node.larger);
            }
        }
    }
}

/// In-place left rotation by `shift` using the juggling algorithm:
/// gcd(n,shift) independent cycles, each element moved exactly once.
fn rotate_left(v: &mut [Node], shift: usize) {
    let n = v.len();
    if n <= 1 || shift % n == 0 {
        return;
    }
    let shift = shift % n;
    for start in 0..gcd(n,shift) {
        let first = v[start];
        let mut i = start;
        loop {
            let next = (i + shift) % n;
            if next == start {
                break;
            }
            v[i] = v[next];
            i = next;
        }
        v[i] = first;
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a,b) = (b,a % b);
    }
    a
}

#[cfg(test)]
fn build_sample() -> MatchTree {
    // shape:       sentinel
    //                  |
    //                  3
    //                 / \
    //                1   5
    //               / \   \
    //              0   2   6
    let mut tree = MatchTree::create(8);
    tree.seed(3);
    tree.attach(3,Side::Smaller,1);
    tree.attach(3,Side::Larger,5);
    tree.attach(1,Side::Smaller,0);
    tree.attach(1,Side::Larger,2);
    tree.attach(5,Side::Larger,6);
    tree
}

#[test]
fn delete_leaf() {
    let mut tree = build_sample();
    tree.delete(2);
    assert!(!tree.is_linked(2));
    assert_eq!(tree.child(1,Side::Larger),UNUSED);
    assert_eq!(tree.child(1,Side::Smaller),0);
}

#[test]
fn delete_single_child() {
    let mut tree = build_sample();
    tree.delete(5);
    assert!(!tree.is_linked(5));
    assert_eq!(tree.child(3,Side::Larger),6);
    assert_eq!(tree.nodes[6].parent,3);
}

#[test]
fn delete_two_children_substitutes_predecessor() {
    let mut tree = build_sample();
    tree.delete(3);
    assert!(!tree.is_linked(3));
    // 2 is the rightmost node of 3's left subtree
    assert_eq!(tree.root(),2);
    assert_eq!(tree.child(2,Side::Smaller),1);
    assert_eq!(tree.child(2,Side::Larger),5);
    assert_eq!(tree.nodes[1].parent,2);
    assert_eq!(tree.nodes[5].parent,2);
    assert_eq!(tree.child(1,Side::Smaller),0);
    assert_eq!(tree.child(1,Side::Larger),UNUSED);
}

#[test]
fn delete_unlinked_is_a_noop() {
    let mut tree = build_sample();
    let before = tree.nodes.clone();
    tree.delete(7);
    assert_eq!(tree.nodes,before);
}

#[test]
fn replace_takes_over_links() {
    let mut tree = build_sample();
    tree.replace(1,7);
    assert!(!tree.is_linked(1));
    assert_eq!(tree.child(3,Side::Smaller),7);
    assert_eq!(tree.child(7,Side::Smaller),0);
    assert_eq!(tree.child(7,Side::Larger),2);
    assert_eq!(tree.nodes[0].parent,7);
    assert_eq!(tree.nodes[2].parent,7);
}

#[test]
fn replace_at_the_root() {
    let mut tree = build_sample();
    tree.delete(7);
    tree.replace(3,7);
    assert_eq!(tree.root(),7);
    assert_eq!(tree.nodes[7].parent,8);
    assert_eq!(tree.child(7,Side::Smaller),1);
    assert_eq!(tree.child(7,Side::Larger),5);
}

#[test]
fn reindex_rotates_and_shifts() {
    let mut tree = build_sample();
    tree.reindex(3);
    // every index i becomes (i + 8 - 3) % 8
    assert_eq!(tree.root(),0);
    assert_eq!(tree.child(0,Side::Smaller),6);
    assert_eq!(tree.child(0,Side::Larger),2);
    assert_eq!(tree.child(6,Side::Smaller),5);
    assert_eq!(tree.child(6,Side::Larger),7);
    assert_eq!(tree.child(2,Side::Larger),3);
    assert_eq!(tree.nodes[0].parent,8);
    assert_eq!(tree.nodes[2].parent,0);
}

#[test]
fn rotation_cycles() {
    // rotations whose shift shares a factor with the length exercise
    // multiple juggling cycles
    for n in 1..=12usize {
        for shift in 0..n {
            let mut v: Vec<Node> = (0..n).map(|i| Node { parent: i as u16, smaller: UNUSED, larger: UNUSED }).collect();
            rotate_left(&mut v,shift);
            for i in 0..n {
                assert_eq!(v[i].parent,((i + shift) % n) as u16);
            }
        }
    }
}
