use super::{Arena, sys};
use crate::error::HeapError;

#[test]
fn grows_monotonically() {
    let mut arena = Arena::with_reserve(64 * 1024);
    assert!(arena.is_empty());
    assert!(arena.base().is_none(), "nothing is reserved before the first grow");

    assert_eq!(arena.grow(48), Ok(0));
    assert_eq!(arena.grow(100), Ok(48));
    assert_eq!(arena.len(), 148);
    assert!(arena.committed() >= arena.len());
    assert_eq!(arena.committed() % sys::page_size(), 0);
}

#[test]
fn granted_memory_is_writable_and_zeroed() {
    let mut arena = Arena::with_reserve(4 * sys::page_size());
    let len = sys::page_size() + 16;
    let offset = arena.grow(len).unwrap();
    let ptr = arena.ptr_at(offset, len).unwrap();

    unsafe {
        let bytes = core::slice::from_raw_parts_mut(ptr.as_ptr(), len);
        assert!(bytes.iter().all(|b| *b == 0));
        bytes.fill(0xAB);
        assert_eq!(bytes[len - 1], 0xAB);
    }
}

#[test]
fn refuses_growth_past_the_reservation() {
    let page = sys::page_size();
    let mut arena = Arena::with_reserve(page);
    assert_eq!(arena.reserved(), page);

    arena.grow(page - 8).unwrap();
    assert_eq!(arena.grow(16), Err(HeapError::OutOfMemory));
    assert_eq!(arena.len(), page - 8, "a failed grow must not move the break");
    assert_eq!(arena.grow(8), Ok(page - 8));
}

#[test]
fn reservation_rounds_to_pages() {
    let page = sys::page_size();
    let arena = Arena::with_reserve(page + 1);
    assert_eq!(arena.reserved(), 2 * page);
}

#[test]
fn offsets_round_trip() {
    let mut arena = Arena::with_reserve(4096);
    arena.grow(256).unwrap();

    let ptr = arena.ptr_at(128, 8).unwrap();
    assert_eq!(arena.offset_of(ptr.as_ptr()), Some(128));

    assert!(arena.ptr_at(250, 8).is_none(), "range ends past the break");
    assert!(arena.offset_of(core::ptr::null()).is_none());
}
