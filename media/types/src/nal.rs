/*!
    Annex-B NAL unit helpers.

    Video leaves the demuxer start-code delimited (`00 00 01` or `00 00 00 01`).
    Transport packetizers split each access unit into NAL units with
    [`split_nalu`] and classify them through the [`AnnexB`] implementation of
    the stream's header convention: [`H264`] uses a one byte NAL header,
    [`H265`] a two byte one.
*/

/**
    H.264 NAL unit types.
*/
pub mod h264 {
    pub const CODED_SLICE_NON_IDR: u8 = 1;
    pub const CODED_SLICE_IDR: u8 = 5;
    pub const SEI: u8 = 6;
    pub const SPS: u8 = 7;
    pub const PPS: u8 = 8;
    pub const ACCESS_UNIT_DELIMITER: u8 = 9;
    pub const END_OF_SEQUENCE: u8 = 10;
    pub const END_OF_STREAM: u8 = 11;
    pub const FILLER_DATA: u8 = 12;
}

/**
    H.265 NAL unit types.
*/
pub mod h265 {
    pub const TRAIL_N: u8 = 0;
    pub const TRAIL_R: u8 = 1;
    pub const BLA_W_LP: u8 = 16;
    pub const IDR_W_RADL: u8 = 19;
    pub const IDR_N_LP: u8 = 20;
    pub const CRA_NUT: u8 = 21;
    pub const VPS: u8 = 32;
    pub const SPS: u8 = 33;
    pub const PPS: u8 = 34;
    pub const ACCESS_UNIT_DELIMITER: u8 = 35;
    pub const END_OF_SEQUENCE: u8 = 36;
    pub const END_OF_BITSTREAM: u8 = 37;
    pub const FILLER_DATA: u8 = 38;
    pub const PREFIX_SEI: u8 = 39;
    pub const SUFFIX_SEI: u8 = 40;
}

/**
    Header convention of a NAL-based codec.

    Methods take a single NAL unit without its start code. Units too short to
    hold a header yield `None`.
*/
pub trait AnnexB: Send + Sync {
    /**
        Returns the unit type code of `nal`.
    */
    fn unit_type(&self, nal: &[u8]) -> Option<u8>;

    /**
        Splits `nal` into its header and payload.
    */
    fn split_header<'a>(&self, nal: &'a [u8]) -> Option<(&'a [u8], &'a [u8])>;

    /**
        Returns true if `unit_type` is the access unit delimiter of this codec.
    */
    fn is_access_unit_delimiter(&self, unit_type: u8) -> bool;
}

/**
    Short header convention (one byte, type in bits 0-4).
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct H264;

/**
    Long header convention (two bytes, type in bits 1-6 of the first byte).
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct H265;

impl AnnexB for H264 {
    fn unit_type(&self, nal: &[u8]) -> Option<u8> {
        nal.first().map(|b| b & 0x1F)
    }

    fn split_header<'a>(&self, nal: &'a [u8]) -> Option<(&'a [u8], &'a [u8])> {
        (!nal.is_empty()).then(|| nal.split_at(1))
    }

    fn is_access_unit_delimiter(&self, unit_type: u8) -> bool {
        unit_type == h264::ACCESS_UNIT_DELIMITER
    }
}

impl AnnexB for H265 {
    fn unit_type(&self, nal: &[u8]) -> Option<u8> {
        nal.first().map(|b| (b >> 1) & 0x3F)
    }

    fn split_header<'a>(&self, nal: &'a [u8]) -> Option<(&'a [u8], &'a [u8])> {
        (nal.len() >= 2).then(|| nal.split_at(2))
    }

    fn is_access_unit_delimiter(&self, unit_type: u8) -> bool {
        unit_type == h265::ACCESS_UNIT_DELIMITER
    }
}

const START_CODE: [u8; 3] = [0, 0, 1];

/**
    Splits a start-code delimited buffer into NAL units.

    A `00` byte directly in front of a `00 00 01` match is treated as part of a
    four byte start code. Empty units are skipped, and the bytes after the last
    start code form the final unit.
*/
pub fn split_nalu(buf: &[u8]) -> SplitNalu<'_> {
    SplitNalu { rest: buf }
}

/**
    Iterator returned by [`split_nalu`].
*/
#[derive(Clone, Debug)]
pub struct SplitNalu<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for SplitNalu<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        while !self.rest.is_empty() {
            let rest = self.rest;
            let (unit, tail) = match find_start_code(rest) {
                Some(pos) => {
                    let begin = if pos > 0 && rest[pos - 1] == 0 { pos - 1 } else { pos };
                    (&rest[..begin], &rest[pos + START_CODE.len()..])
                }
                None => (rest, &rest[rest.len()..]),
            };
            self.rest = tail;
            if !unit.is_empty() {
                return Some(unit);
            }
        }
        None
    }
}

fn find_start_code(buf: &[u8]) -> Option<usize> {
    buf.windows(START_CODE.len()).position(|w| w == START_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(buf: &[u8]) -> Vec<&[u8]> {
        split_nalu(buf).collect()
    }

    #[test]
    fn split_without_start_code_yields_whole_buffer() {
        assert_eq!(split(&[0x65, 0x88, 0x80]), vec![&[0x65, 0x88, 0x80][..]]);
        assert!(split(&[]).is_empty());
    }

    #[test]
    fn split_recovers_units_joined_with_start_codes() {
        let units: [&[u8]; 4] = [&[0x67, 0x42, 0xC0, 0x1E], &[0x68, 0xCE], &[0x65, 0xFF, 0x01, 0x02], &[0x41]];
        let mut joined = Vec::new();
        for unit in units {
            joined.extend_from_slice(&START_CODE);
            joined.extend_from_slice(unit);
        }
        assert_eq!(split(&joined), units);
    }

    #[test]
    fn four_byte_start_codes_split_identically() {
        let short = [0, 0, 1, 0x09, 0xF0, 0, 0, 1, 0x65, 0xAA];
        let long = [0, 0, 0, 1, 0x09, 0xF0, 0, 0, 0, 1, 0x65, 0xAA];
        assert_eq!(split(&short), split(&long));
        assert_eq!(split(&long), vec![&[0x09, 0xF0][..], &[0x65, 0xAA][..]]);
    }

    #[test]
    fn empty_units_are_dropped() {
        // back-to-back start codes, then a buffer ending on a start code
        let buf = [0, 0, 1, 0, 0, 1, 0x41, 0x9A, 0, 0, 1];
        assert_eq!(split(&buf), vec![&[0x41, 0x9A][..]]);
    }

    #[test]
    fn leading_bytes_before_first_start_code_form_a_unit() {
        let buf = [0x41, 0x01, 0, 0, 1, 0x41, 0x02];
        assert_eq!(split(&buf), vec![&[0x41, 0x01][..], &[0x41, 0x02][..]]);
    }

    #[test]
    fn h264_unit_types() {
        assert_eq!(H264.unit_type(&[0x09, 0xF0]), Some(9));
        assert!(H264.is_access_unit_delimiter(9));
        assert_eq!(H264.unit_type(&[0x67]), Some(h264::SPS));
        assert_eq!(H264.unit_type(&[0x65]), Some(h264::CODED_SLICE_IDR));
        assert!(!H264.is_access_unit_delimiter(h264::SPS));
        assert_eq!(H264.unit_type(&[]), None);
    }

    #[test]
    fn h265_unit_types() {
        assert_eq!(H265.unit_type(&[0x46, 0x01]), Some(35));
        assert!(H265.is_access_unit_delimiter(35));
        assert_eq!(H265.unit_type(&[0x40, 0x01]), Some(h265::VPS));
        assert_eq!(H265.unit_type(&[0x26, 0x01]), Some(h265::IDR_W_RADL));
        assert!(!H265.is_access_unit_delimiter(9));
    }

    #[test]
    fn split_header() {
        let nal = [0x46, 0x01, 0x50];
        assert_eq!(H264.split_header(&nal), Some((&nal[..1], &nal[1..])));
        assert_eq!(H265.split_header(&nal), Some((&nal[..2], &nal[2..])));
        assert_eq!(H265.split_header(&[0x46]), None);
        assert_eq!(H264.split_header(&[]), None);
    }
}
