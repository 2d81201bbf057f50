use gekko_backend::CodeBuffer;

#[test]
fn emit_and_read_back() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit_u8(0x17);
    buf.emit(&0xDEADBEEFu32.to_le_bytes());
    assert_eq!(buf.offset(), 5);
    assert_eq!(buf.read_u8(0), 0x17);
    assert_eq!(buf.read_u32(1), 0xDEADBEEF);
}

#[test]
fn patch_leaves_the_cursor() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit(&[0; 4]);
    buf.patch_u32(0, 0x12345678);
    assert_eq!(buf.read_u32(0), 0x12345678);
    buf.patch(3, &[0xAA]);
    assert_eq!(buf.read_u8(3), 0xAA);
    assert_eq!(buf.offset(), 4);
}

#[test]
fn regions_split_on_page_boundaries() {
    let buf = CodeBuffer::new(100).unwrap();
    assert!(buf.capacity() >= 4096);
    assert_eq!(buf.capacity() % 4096, 0);
    assert_eq!(buf.code_limit(), buf.capacity());
    assert!(buf.trampoline_region().is_empty());

    let buf = CodeBuffer::with_trampolines(64 * 1024, 4096).unwrap();
    let tramp = buf.trampoline_region();
    assert_eq!(tramp.end, buf.capacity());
    assert_eq!(tramp.start, buf.code_limit());
    assert!(tramp.len() >= 4096);
    assert_eq!(buf.code_room(), buf.code_limit());
}

#[test]
fn rewind_drops_later_code() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit(&[1, 2, 3, 4]);
    buf.rewind(1);
    buf.emit_u8(9);
    assert_eq!(buf.range(0, 4), &[1, 9, 3, 4]);
    assert_eq!(buf.offset(), 2);
    assert_eq!(buf.tail(2)[..2], [3, 4]);
}

#[test]
#[should_panic(expected = "rewind past the code region")]
fn rewind_into_trampolines_panics() {
    let mut buf = CodeBuffer::with_trampolines(8192, 4096).unwrap();
    let at = buf.trampoline_region().start + 1;
    buf.rewind(at);
}

#[test]
fn emit_at_restores_the_cursor() {
    let mut buf = CodeBuffer::with_trampolines(8192, 4096).unwrap();
    buf.emit(&[7; 3]);
    let at = buf.trampoline_region().start;
    let (start, end) = buf.emit_at(at, |b| {
        let start = b.offset();
        b.emit(&[0xEE, 0xFF]);
        start
    });
    assert_eq!((start, end), (at, at + 2));
    assert_eq!(buf.offset(), 3);
    assert_eq!(buf.range(at, at + 2), &[0xEE, 0xFF]);
    assert_eq!(buf.code_room(), buf.code_limit() - 3);
}

#[test]
fn fill_overwrites_a_range() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit(&[0; 8]);
    buf.fill(2, 4, 0xCC);
    assert_eq!(buf.range(0, 8), &[0, 0, 0xCC, 0xCC, 0xCC, 0xCC, 0, 0]);
}
