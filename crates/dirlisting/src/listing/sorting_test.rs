//! Tests for name ordering and comb sort.

use std::cmp::Ordering;

use super::entry::{DirEntry, EntryStore};
use super::sorting::{comb_sort, compare_names};

fn entry(name: &str, is_dir: bool) -> DirEntry {
    DirEntry {
        name: name.into(),
        mtime: 0,
        size: 0,
        is_dir,
    }
}

#[test]
fn test_compare_names_is_bytewise() {
    assert_eq!(compare_names(b"B", b"a"), Ordering::Less);
    assert_eq!(compare_names(b"a", b"ab"), Ordering::Less);
    assert_eq!(compare_names(b"file10", b"file9"), Ordering::Less);
    assert_eq!(compare_names(b"\xc3\xa9", b"z"), Ordering::Greater);
}

#[test]
fn test_comb_sort_small_inputs() {
    let mut empty: Vec<u32> = Vec::new();
    comb_sort(&mut empty, |a, b| a.cmp(b));
    assert!(empty.is_empty());

    let mut one = vec![7];
    comb_sort(&mut one, |a, b| a.cmp(b));
    assert_eq!(one, vec![7]);

    let mut two = vec![2, 1];
    comb_sort(&mut two, |a, b| a.cmp(b));
    assert_eq!(two, vec![1, 2]);
}

#[test]
fn test_comb_sort_matches_std_sort() {
    // Deterministic pseudo-random input, long enough to pass through the 9/10 -> 11 gap rule
    let mut state: u32 = 12345;
    let mut values: Vec<u32> = (0..500)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            state >> 16
        })
        .collect();
    let mut expected = values.clone();
    expected.sort();

    comb_sort(&mut values, |a, b| a.cmp(b));
    assert_eq!(values, expected);
}

#[test]
fn test_comb_sort_reversed_and_sorted_input() {
    let mut reversed: Vec<u32> = (0..100).rev().collect();
    comb_sort(&mut reversed, |a, b| a.cmp(b));
    assert_eq!(reversed, (0..100).collect::<Vec<_>>());

    let mut sorted: Vec<u32> = (0..100).collect();
    comb_sort(&mut sorted, |a, b| a.cmp(b));
    assert_eq!(sorted, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_entry_store_sorts_directories_and_files_separately() {
    let mut store = EntryStore::new();
    for (name, is_dir) in [("zeta", false), ("beta", true), ("Alpha", false), ("alpha", true), ("b", false)] {
        store.push(entry(name, is_dir));
    }
    store.sort();

    let dirs: Vec<_> = store.directories().iter().map(|e| e.name.to_str().unwrap()).collect();
    let files: Vec<_> = store.files().iter().map(|e| e.name.to_str().unwrap()).collect();
    assert_eq!(dirs, vec!["alpha", "beta"]);
    assert_eq!(files, vec!["Alpha", "b", "zeta"]);
    assert_eq!(store.len(), 5);
}

#[test]
fn test_entry_store_grows_past_initial_capacity() {
    let mut store = EntryStore::new();
    for i in 0..100 {
        store.push(entry(&format!("f{:03}", 99 - i), false));
    }
    store.sort();
    assert_eq!(store.files().len(), 100);
    assert_eq!(store.files()[0].name, "f000");
    assert_eq!(store.files()[99].name, "f099");
}
