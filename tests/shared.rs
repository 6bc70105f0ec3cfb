use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use sharc::Shared;

struct A;

// Counts how many times values built from it are dropped.
#[derive(Clone, Default)]
struct Drops(Arc<AtomicUsize>);

impl Drops {
    fn track(&self) -> Tracked {
        Tracked(self.0.clone())
    }

    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

struct Tracked(Arc<AtomicUsize>);

impl Drop for Tracked {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn simple() {
    let a = Shared::new(!0usize);
    drop(a);
}

#[test]
fn simple_use_count() {
    let mut sp = Shared::from_box(Box::new(A));
    assert_eq!(1, sp.use_count());

    sp.reset();
    assert_eq!(0, sp.use_count());

    sp.reset_with(Box::new(A));
    assert_eq!(1, sp.use_count());
}

#[test]
fn complex_use_count() {
    let sp1 = Shared::from_box(Box::new(A));
    let mut sp2 = sp1.clone();

    assert!(sp1.use_count() == sp2.use_count() && sp1.use_count() == 2);

    sp2.reset();
    assert!(sp2.use_count() == 0 && sp1.use_count() == 1);
}

#[test]
fn last_reset_disposes_once() {
    let drops = Drops::default();
    let mut h1 = Shared::new(drops.track());
    let mut h2 = h1.clone();
    assert_eq!(h1.use_count(), 2);
    assert!(!h1.unique());

    h2.reset();
    assert_eq!(h2.use_count(), 0);
    assert_eq!(h1.use_count(), 1);
    assert!(h1.unique());
    assert_eq!(drops.count(), 0);

    h1.reset();
    assert_eq!(drops.count(), 1);
    assert_eq!(h1.use_count(), 0);

    // resetting an already null handle must not dispose again
    h1.reset();
    assert_eq!(drops.count(), 1);
}

#[test]
fn boxed_value_disposed_once() {
    let drops = Drops::default();
    let h = Shared::from_box(Box::new(drops.track()));
    let copies: Vec<_> = (0..10).map(|_| h.clone()).collect();
    assert_eq!(h.use_count(), 11);
    drop(copies);
    assert_eq!(h.use_count(), 1);
    assert_eq!(drops.count(), 0);
    drop(h);
    assert_eq!(drops.count(), 1);
}

#[test]
fn use_count_follows_live_copies() {
    let root = Shared::new(0u64);
    let mut copies = Vec::new();
    for expected in 2..=8 {
        copies.push(root.clone());
        assert_eq!(root.use_count(), expected);
    }
    while let Some(copy) = copies.pop() {
        assert_eq!(copy.use_count(), copies.len() + 2);
        drop(copy);
    }
    assert_eq!(root.use_count(), 1);
}

#[test]
fn null_handle() {
    let h3: Shared<A> = Shared::null();
    assert!(h3.is_null());
    assert!(h3.get().is_none());
    assert_eq!(h3.use_count(), 0);
    assert!(!h3.unique());

    let d: Shared<A> = Shared::default();
    assert!(h3 == d);
    assert_eq!(format!("{:?}", Shared::<u8>::null()), "null");
}

#[test]
#[should_panic(expected = "null Shared")]
fn deref_null_panics() {
    let h: Shared<u32> = Shared::null();
    let _value: u32 = *h;
}

#[test]
fn take_moves_without_counting() {
    let mut a = Shared::new(String::from("moved"));
    let b = a.clone();
    let c = a.take();

    assert!(a.is_null());
    assert!(a.as_ptr().is_none());
    assert_eq!(a.use_count(), 0);
    assert_eq!(c.use_count(), 2);
    assert_eq!(b, c);
}

#[test]
fn move_leaves_count_untouched() {
    let a = Shared::new(1i32);
    let b = a.clone();
    let moved = a;
    assert_eq!(moved.use_count(), 2);
    assert_eq!(b.use_count(), 2);
}

#[test]
fn swap_exchanges_targets() {
    let mut a = Shared::new(1);
    let mut b = Shared::new(2);
    let keep = a.clone();
    a.swap(&mut b);
    assert_eq!(*a, 2);
    assert_eq!(*b, 1);
    assert_eq!(a.use_count(), 1);
    assert_eq!(b.use_count(), 2);
    assert_eq!(b, keep);
}

#[test]
fn clone_from_releases_previous_owner() {
    let drops = Drops::default();
    let mut a = Shared::new(drops.track());
    let b = Shared::new(drops.track());

    a.clone_from(&b);
    assert_eq!(drops.count(), 1);
    assert_eq!(b.use_count(), 2);

    let same = a.clone();
    a.clone_from(&same);
    assert_eq!(b.use_count(), 3);
    assert_eq!(drops.count(), 1);
}

struct Parent {
    name: String,
    _child: Tracked,
}

#[test]
fn aliased_handle_keeps_parent_alive() {
    let drops = Drops::default();
    let parent = Shared::new(Parent {
        name: String::from("root"),
        _child: drops.track(),
    });

    let name = Shared::map(&parent, |p| &p.name);
    assert!(Shared::ptr_eq(&name, &Shared::map(&parent, |p| &p.name)));
    assert_eq!(name.use_count(), 2);
    assert!(Shared::owner_eq(&parent, &name));
    assert_eq!(name.as_ptr().unwrap().as_ptr() as *const String, &parent.name as *const String);

    drop(parent);
    assert_eq!(drops.count(), 0);
    assert_eq!(*name, "root");
    assert_eq!(name.use_count(), 1);

    drop(name);
    assert_eq!(drops.count(), 1);
}

#[test]
fn raw_aliasing_points_into_source() {
    let pair = Shared::new((String::from("left"), String::from("right")));
    let right: Shared<String> = unsafe { Shared::aliasing(&pair, &pair.1) };
    assert_eq!(pair.use_count(), 2);
    drop(pair);
    assert_eq!(*right, "right");
}

trait Shape: Send + Sync {
    fn area(&self) -> f64;
}

struct Square(f64);

impl Shape for Square {
    fn area(&self) -> f64 {
        self.0 * self.0
    }
}

fn as_shape(square: &Square) -> &(dyn Shape + 'static) {
    square
}

#[test]
fn converting_move_keeps_ownership() {
    let drops = Drops::default();
    let square = Shared::new((Square(3.0), drops.track()));
    let copy = square.clone();

    let shape: Shared<dyn Shape> = Shared::map_into(square, |s| as_shape(&s.0));
    assert_eq!(shape.area(), 9.0);
    assert_eq!(shape.use_count(), 2);

    drop(copy);
    assert_eq!(drops.count(), 0);
    drop(shape);
    assert_eq!(drops.count(), 1);
}

#[test]
fn boxed_trait_object() {
    let boxed: Box<dyn Shape> = Box::new(Square(2.0));
    let shape = Shared::from_box(boxed);
    let other = shape.clone();
    assert_eq!(other.area(), 4.0);
    assert!(Shared::ptr_eq(&shape, &other));
}

#[test]
fn boxed_slice() {
    let slice: Shared<[u8]> = Box::<[u8]>::from(&b"abc"[..]).into();
    assert_eq!(&*slice, b"abc");
    assert_eq!(slice.use_count(), 1);
}

#[test]
fn filter_map_shares_on_success_only() {
    let list = Shared::new(vec![10, 20, 30]);
    let second = Shared::filter_map(&list, |l| l.get(1)).unwrap();
    assert_eq!(*second, 20);
    assert!(Shared::filter_map(&list, |l| l.get(9)).is_none());
    assert_eq!(list.use_count(), 2);
}

#[test]
fn fallible_constructors() {
    let a = Shared::try_new(5u8).unwrap();
    assert_eq!(*a, 5);
    let b = Shared::try_from_box(Box::new([1u16; 4])).unwrap();
    assert_eq!(b.use_count(), 1);
}

#[test]
fn from_raw_null_is_empty() {
    let h: Shared<A> = unsafe { Shared::from_raw(std::ptr::null_mut()) };
    assert!(h.is_null());
    assert_eq!(h.use_count(), 0);
}

#[test]
fn identity_comparisons() {
    let a = Shared::new(7);
    let b = a.clone();
    let c = Shared::new(7);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);

    let mut set = std::collections::HashSet::new();
    set.insert(a.clone());
    set.insert(b);
    set.insert(c);
    assert_eq!(set.len(), 2);
    assert_eq!(format!("{}", a), "7");
    assert_eq!(format!("{:p}", a), format!("{:p}", &*a as *const i32));
}

#[test]
#[cfg_attr(miri, ignore)]
fn strong_cycle_leaks() {
    use std::sync::Mutex;

    struct Node {
        next: Mutex<Shared<Node>>,
        _tracked: Tracked,
    }

    let drops = Drops::default();
    let a = Shared::new(Node {
        next: Mutex::new(Shared::null()),
        _tracked: drops.track(),
    });
    *a.next.lock().unwrap() = a.clone();
    assert_eq!(a.use_count(), 2);
    drop(a);
    assert_eq!(drops.count(), 0);
}
