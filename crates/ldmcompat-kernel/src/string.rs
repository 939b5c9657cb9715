//! C string helpers decoders rely on

/// Length of the NUL-terminated string in `s`, or `s.len()` if there is
/// no terminator
pub fn strnlen(s: &[u8]) -> usize {
    s.iter().position(|&b| b == 0).unwrap_or(s.len())
}

/// Append `src` to the string already in `dest`.
///
/// `dest.len()` is the total capacity including the terminator. At most
/// `dest.len() - strlen(dest) - 1` bytes are copied and the result is always
/// NUL-terminated. Returns `strlen(dest) + strlen(src)` as they were before
/// the call; a value `>= dest.len()` means the result was truncated.
///
/// If `dest` holds no terminator nothing is written and the return value is
/// `dest.len() + strlen(src)`.
pub fn strlcat(dest: &mut [u8], src: &[u8]) -> usize {
    let src_len = strnlen(src);
    let dsize = strnlen(dest);
    if dsize == dest.len() {
        return dsize + src_len;
    }

    let room = dest.len() - dsize - 1;
    let n = src_len.min(room);
    dest[dsize..dsize + n].copy_from_slice(&src[..n]);
    dest[dsize + n] = 0;
    dsize + src_len
}

/// Value of one hex digit
pub const fn hex_to_bin(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}
