use crate::result::*;

/// A checked cast from u64 to usize
///
/// We could use the `cast` crate,
/// (https://docs.rs/cast/0.2.3/cast/)
/// but this is the only one we really need.
pub fn usize<I: Into<u64>>(i: I) -> ArchiveResult<usize> {
    let i: u64 = i.into();
    usize::try_from(i).map_err(|_| ArchiveError::InsufficientAddressSpace)
}

/// Checks that a name, extra field, or comment fits the 16-bit length
/// field it gets serialized behind.
pub fn u16_len(len: usize, what: &str) -> ArchiveResult<u16> {
    u16::try_from(len).map_err(|_| {
        ArchiveError::format(format!(
            "{what} is {len} bytes long, more than a 16-bit length allows"
        ))
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sixteen_bit_lengths() {
        assert_eq!(u16_len(0xffff, "Name").unwrap(), 0xffff);
        match u16_len(0x10000, "Name") {
            Err(ArchiveError::Format(msg)) => assert!(msg.starts_with("Name is 65536")),
            other => panic!("Unexpected {:?}", other),
        }
    }
}
