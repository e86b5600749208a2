// Copyright (c) 2022-2023 The MobileCoin Foundation

/// Fixed-size array helpers (pending nightly array constructors)
pub(crate) mod arr {
    use crate::{check_len, ProtoError};

    pub fn enc<const N: usize>(d: &[u8; N], buff: &mut [u8]) -> Result<usize, ProtoError> {
        check_len(buff, N)?;

        buff[..N].copy_from_slice(&d[..]);

        Ok(N)
    }

    pub fn dec<const N: usize>(buff: &[u8]) -> Result<([u8; N], usize), ProtoError> {
        check_len(buff, N)?;

        let mut d = [0u8; N];
        d.copy_from_slice(&buff[..N]);

        Ok((d, N))
    }
}

/// Big-endian integer helpers
pub(crate) mod be {
    use byteorder::{BigEndian, ByteOrder};

    use crate::{check_len, ProtoError};

    pub fn enc_u16(v: u16, buff: &mut [u8]) -> Result<usize, ProtoError> {
        check_len(buff, 2)?;
        BigEndian::write_u16(buff, v);
        Ok(2)
    }

    pub fn enc_u32(v: u32, buff: &mut [u8]) -> Result<usize, ProtoError> {
        check_len(buff, 4)?;
        BigEndian::write_u32(buff, v);
        Ok(4)
    }

    pub fn dec_u16(buff: &[u8]) -> Result<(u16, usize), ProtoError> {
        check_len(buff, 2)?;
        Ok((BigEndian::read_u16(buff), 2))
    }

    pub fn dec_u32(buff: &[u8]) -> Result<(u32, usize), ProtoError> {
        check_len(buff, 4)?;
        Ok((BigEndian::read_u32(buff), 4))
    }
}
