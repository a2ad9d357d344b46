//! Compression and expansion state machines.
//! Each token leaves the match finder as an abstract `Token` and is
//! packed here: a symbol token is a 0 bit followed by the literal byte,
//! a phrase token is a 1 bit, the window offset, and a length code.  A
//! phrase-shaped token with an all-zero offset and the dedicated
//! length-0 code terminates the stream, so expansion never depends on
//! knowing the compressed size in advance.

use crate::bitstream::{BitReader,BitWriter};
use crate::length_code::LengthCode;
use crate::window::{InputWindow,OutputWindow,Token};
use crate::{Error,NEXT_BITS,TYPE_BITS};

/// Compress the whole input to the bit sink.  Returns the total bytes
/// written, header and final padding included.
pub fn compress(src: &mut InputWindow, dst: &mut BitWriter) -> Result<u64,Error> {
    src.open()?;
    let opts = src.options();
    dst.open(&opts)?;
    let offset_bits = opts.offset_bits();
    let total = src.total_bytes();
    let progress = crate::progress_handler();
    while let Some(token) = src.next_token()? {
        let (reg,nbits) = match token {
            Token::Literal(next) => (next as u64,TYPE_BITS + NEXT_BITS),
            Token::Phrase { offset, length } => {
                let (code,code_bits) = src.lengths().encode(length);
                let reg = (((1 << offset_bits) | offset as u64) << code_bits) | code as u64;
                (reg,TYPE_BITS + offset_bits + code_bits)
            }
        };
        dst.write_bits(reg,nbits)?;
        if let Some(report) = progress {
            let percent = match total {
                Some(total) if total > 0 => 100.0 * src.processed_bytes() as f32 / total as f32,
                _ => 0.0
            };
            report(src.processed_bytes(),dst.processed_bits() / 8,percent);
        }
    }
    let (code,code_bits) = src.lengths().encode(0);
    let reg = ((1 << offset_bits) << code_bits) | code as u64;
    dst.write_bits(reg,TYPE_BITS + offset_bits + code_bits)?;
    dst.close()?;
    Ok((dst.processed_bits() + 7) / 8)
}

/// Expand a compressed stream to the byte sink.  Returns the total
/// bytes reconstructed.
pub fn decompress(src: &mut BitReader, dst: &mut OutputWindow) -> Result<u64,Error> {
    let opts = src.open()?;
    dst.open(&opts)?;
    let offset_bits = opts.offset_bits();
    let lengths = LengthCode::create(opts.min_match_length(),opts.lookahead_size);
    let total = src.total_bytes();
    let progress = crate::progress_handler();
    loop {
        let (kind,n) = src.read_bits(TYPE_BITS)?;
        if n != TYPE_BITS {
            log::error!("stream ended before the terminating token");
            return Err(Error::InvalidFormat);
        }
        if kind == 1 {
            let (offset,n) = src.read_bits(offset_bits)?;
            if n != offset_bits {
                log::error!("stream ended inside a phrase token");
                return Err(Error::InvalidFormat);
            }
            let (peeked,peeked_nbits) = src.peek_bits(16)?;
            let peeked = match peeked_nbits {
                0 => 0,
                n => (peeked as u16) << (16 - n)
            };
            let (length,consumed) = match lengths.decode(peeked,peeked_nbits)? {
                Some(pair) => pair,
                None => {
                    log::error!("stream ended inside a length code");
                    return Err(Error::InvalidFormat);
                }
            };
            src.consume(consumed);
            if length == 0 {
                // the terminating token
                break;
            }
            dst.save(Token::Phrase { offset: offset as u16, length })?;
        } else {
            let (next,n) = src.read_bits(NEXT_BITS)?;
            if n != NEXT_BITS {
                log::error!("stream ended inside a symbol token");
                return Err(Error::InvalidFormat);
            }
            dst.save(Token::Literal(next as u8))?;
        }
        if let Some(report) = progress {
            let percent = match total {
                Some(total) if total > 0 => 100.0 * (src.processed_bits() / 8) as f32 / total as f32,
                _ => 0.0
            };
            report(dst.processed_bytes(),src.processed_bits() / 8,percent);
        }
    }
    dst.close()?;
    Ok(dst.processed_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compress_slice,expand_slice,Options};

    fn roundtrip(data: &[u8], window_size: u16, lookahead_size: u16) {
        let opts = Options { window_size, lookahead_size };
        let compressed = compress_slice(data,&opts).expect("compression failed");
        assert!(compressed.len() >= crate::bitstream::HEADER_SIZE);
        let expanded = expand_slice(&compressed).expect("expansion failed");
        assert_eq!(data,expanded,"window {} look-ahead {}",window_size,lookahead_size);
    }

    fn lcg_bytes(count: usize, mut state: u64) -> Vec<u8> {
        let mut ans = Vec::new();
        for _i in 0..count {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ans.push((state >> 33) as u8);
        }
        ans
    }

    #[test]
    fn compression_works() {
        // empty input is just the header and the terminating token
        let opts = Options { window_size: 512, lookahead_size: 32 };
        let compressed = compress_slice(b"",&opts).expect("compression failed");
        assert_eq!(compressed,hex::decode("4c5a37371000020000208000").unwrap());
        assert_eq!(expand_slice(&compressed).expect("expansion failed"),b"");

        // literal, two matches, and a right-boundary match of length 1
        let opts = Options { window_size: 4, lookahead_size: 2 };
        let compressed = compress_slice(b"AAAAAA",&opts).expect("compression failed");
        assert_eq!(compressed,hex::decode("4c5a373710000004000220cb5f8000").unwrap());
    }

    #[test]
    fn invertibility() {
        roundtrip(b"BBAAABBC",4,2);
        roundtrip(b"AAABBCAB",4,2);
        roundtrip(b"YAZABCDEFGHI",8,4);
        roundtrip(b"I am Sam. Sam I am. I do not like this Sam I am.\n",64,16);
    }

    #[test]
    fn overlapping_match_expands_by_run_length() {
        let opts = Options { window_size: 4, lookahead_size: 2 };
        let compressed = compress_slice(b"AAAAAA",&opts).expect("compression failed");
        assert_eq!(expand_slice(&compressed).expect("expansion failed"),b"AAAAAA");
    }

    #[test]
    fn random_data_survives() {
        let opts = Options { window_size: 512, lookahead_size: 32 };
        let data = lcg_bytes(512,12345);
        let compressed = compress_slice(&data,&opts).expect("compression failed");
        assert!(compressed.len() >= crate::bitstream::HEADER_SIZE);
        assert_eq!(expand_slice(&compressed).expect("expansion failed"),data);
    }

    #[test]
    fn runs_compress_well() {
        let opts = Options { window_size: 512, lookahead_size: 32 };
        let data = vec![0u8;4096];
        let compressed = compress_slice(&data,&opts).expect("compression failed");
        assert!(compressed.len() < 1024);
        let expanded = expand_slice(&compressed).expect("expansion failed");
        assert_eq!(expanded,data);
    }

    #[test]
    fn boundary_sizes() {
        // every size from empty through window-full plus a fully
        // overflowing look-ahead
        for (w,l) in [(8u16,4u16),(16,6)] {
            let limit = (w + 2 * l + 2) as usize;
            let random = lcg_bytes(limit,w as u64);
            for n in 0..=limit {
                roundtrip(&vec![b'x';n],w,l);
                roundtrip(&random[0..n],w,l);
            }
        }
    }

    #[test]
    fn parameter_sweep() {
        for w in 4..=16u16 {
            for l in 2..=w.min(24) {
                let constant = vec![b'q';100];
                let alternating: Vec<u8> = (0..100).map(|i| b"ABAB"[i % 4]).collect();
                let random = lcg_bytes(100,(w as u64) << 16 | l as u64);
                roundtrip(&constant,w,l);
                roundtrip(&alternating,w,l);
                roundtrip(&random,w,l);
            }
        }
    }

    #[test]
    fn lookahead_limit_of_the_length_tail() {
        // with a 4096-byte window the smallest phrase length is 2, so
        // the length code's 10-bit tail caps the look-ahead at
        // 2 + 6 + 1023 = 1031; constant input drives matches of the
        // full look-ahead through the widest tail
        let data = vec![b'z';4000];
        roundtrip(&data,4096,1031);

        // one past the cap is rejected before any bits are written
        let opts = Options { window_size: 4096, lookahead_size: 1032 };
        assert!(matches!(compress_slice(&data,&opts),Err(Error::InvalidArgument(_))));

        // a header claiming the oversize look-ahead fails at open, not
        // by misreading tokens
        let good = compress_slice(&data,&Options { window_size: 4096, lookahead_size: 1031 })
            .expect("compression failed");
        let mut bad = good.clone();
        bad[8..10].copy_from_slice(&1032u16.to_be_bytes());
        assert!(matches!(expand_slice(&bad),Err(Error::InvalidFormat)));
    }

    #[test]
    fn trailing_garbage_is_ignored() {
        // the terminating token alone ends the stream
        let opts = Options { window_size: 4, lookahead_size: 2 };
        let mut compressed = compress_slice(b"BBAAABBC",&opts).expect("compression failed");
        compressed.extend_from_slice(&[0xFF,0xFF,0xFF]);
        assert_eq!(expand_slice(&compressed).expect("expansion failed"),b"BBAAABBC");
    }

    #[test]
    fn truncation_never_passes_unnoticed() {
        let opts = Options { window_size: 64, lookahead_size: 8 };
        let data = lcg_bytes(400,5);
        let compressed = compress_slice(&data,&opts).expect("compression failed");
        // a cut inside the header always fails
        for keep in 0..crate::bitstream::HEADER_SIZE {
            assert!(matches!(expand_slice(&compressed[0..keep]),Err(Error::InvalidFormat)));
        }
        // A cut inside the token stream fails unless the severed bits
        // happen to spell a terminator, in which case the output is at
        // least visibly short.
        for keep in [crate::bitstream::HEADER_SIZE + 3,compressed.len() - 1] {
            match expand_slice(&compressed[0..keep]) {
                Err(Error::InvalidFormat) => {},
                Err(e) => panic!("unexpected error {:?}",e),
                Ok(out) => assert_ne!(out,data)
            }
        }
    }

    #[test]
    fn pipelines_are_equivalent() {
        // the same bytes must come out of every pairing of memory and
        // reader/writer endpoints, compactions and refills included
        let opts = Options { window_size: 64, lookahead_size: 16 };
        let data: Vec<u8> = lcg_bytes(5000,42).iter().map(|b| b % 11).collect();

        let mem_mem = compress_slice(&data,&opts).expect("compression failed");

        let mut mem_wr = Vec::new();
        {
            let mut src = InputWindow::from_slice(&data,&opts).expect("create failed");
            let mut dst = BitWriter::to_writer(&mut mem_wr);
            compress(&mut src,&mut dst).expect("compression failed");
        }
        assert_eq!(mem_wr,mem_mem);

        let mut cursor = std::io::Cursor::new(&data);
        let mut src = InputWindow::from_reader(&mut cursor,&opts).expect("create failed");
        let mut dst = BitWriter::to_memory(0,true).expect("create failed");
        compress(&mut src,&mut dst).expect("compression failed");
        let rd_mem = dst.into_buffer().unwrap();
        assert_eq!(rd_mem,mem_mem);

        let mut rd_wr = Vec::new();
        {
            let mut cursor = std::io::Cursor::new(&data);
            let mut src = InputWindow::from_reader(&mut cursor,&opts).expect("create failed");
            let mut dst = BitWriter::to_writer(&mut rd_wr);
            compress(&mut src,&mut dst).expect("compression failed");
        }
        assert_eq!(rd_wr,mem_mem);

        // and back out through both kinds of sink
        assert_eq!(expand_slice(&mem_mem).expect("expansion failed"),data);
        let mut expanded = Vec::new();
        {
            let mut cursor = std::io::Cursor::new(&mem_mem);
            let mut src = BitReader::from_reader(&mut cursor);
            let mut dst = OutputWindow::to_writer(&mut expanded);
            decompress(&mut src,&mut dst).expect("expansion failed");
        }
        assert_eq!(expanded,data);
    }

    #[test]
    fn reported_sizes_match() {
        let opts = Options { window_size: 64, lookahead_size: 8 };
        let data = lcg_bytes(1000,77);
        let mut src = InputWindow::from_slice(&data,&opts).expect("create failed");
        let mut dst = BitWriter::to_memory(0,true).expect("create failed");
        let reported = compress(&mut src,&mut dst).expect("compression failed");
        let compressed = dst.into_buffer().unwrap();
        assert_eq!(reported,compressed.len() as u64);
        let mut src = BitReader::from_slice(&compressed);
        let mut dst = OutputWindow::to_memory(0,true).expect("create failed");
        let reported = decompress(&mut src,&mut dst).expect("expansion failed");
        assert_eq!(reported,data.len() as u64);
    }

    #[test]
    fn progress_is_reported() {
        use std::sync::atomic::{AtomicU64,Ordering};
        static CALLS: AtomicU64 = AtomicU64::new(0);
        fn count_calls(_in_bytes: u64, _out_bytes: u64, percent: f32) {
            assert!((0.0..=100.0).contains(&percent));
            CALLS.fetch_add(1,Ordering::Relaxed);
        }
        crate::set_progress_handler(Some(count_calls));
        let opts = Options { window_size: 16, lookahead_size: 4 };
        let compressed = compress_slice(b"mi mi mi mi mi mi",&opts).expect("compression failed");
        expand_slice(&compressed).expect("expansion failed");
        crate::set_progress_handler(None);
        assert!(CALLS.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn files_api() {
        let data = lcg_bytes(2000,1).iter().map(|b| b % 17).collect::<Vec<u8>>();
        let mut compressed = Vec::new();
        let (in_size,out_size) = {
            let mut cursor = std::io::Cursor::new(&data);
            crate::compress(&mut cursor,&mut compressed,&crate::STD_OPTIONS).expect("compression failed")
        };
        assert_eq!(in_size,data.len() as u64);
        assert_eq!(out_size,compressed.len() as u64);
        let mut expanded = Vec::new();
        let (in_size,out_size) = {
            let mut cursor = std::io::Cursor::new(&compressed);
            crate::expand(&mut cursor,&mut expanded).expect("expansion failed")
        };
        assert_eq!(in_size,compressed.len() as u64);
        assert_eq!(out_size,data.len() as u64);
        assert_eq!(expanded,data);
    }
}
