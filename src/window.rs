//! Sliding window and look-ahead management for the uncompressed side.
//!
//! `InputWindow` feeds compression.  It keeps two adjacent regions over
//! one data buffer: the window proper (the most recent bytes already
//! consumed, which serve as the dictionary) followed by the look-ahead
//! (the bytes being matched).  A `MatchTree` indexes every window
//! position; window positions are ring addresses, so node `i` describes
//! the bytes starting at buffer offset `window + ((i - window) mod W)`.
//! Reader-backed inputs hold a buffer of `(W+L)*10` bytes; when the
//! look-ahead would run off its end, the resident window is moved back
//! to the front, fresh bytes are read behind it, and the tree is
//! re-indexed to match.
//!
//! `OutputWindow` receives expansion.  The window over the bytes already
//! produced doubles as the decode dictionary, and phrase copies go one
//! byte at a time when they overlap their own output, so a match may
//! run past the window boundary into bytes it is itself producing.

use std::io::{Read,Write};
use crate::bitstream::read_to_fill;
use crate::length_code::LengthCode;
use crate::tree::{MatchTree,Side,UNUSED};
use crate::{Error,Options};

/// least capacity granted to a growable memory sink
const GROW_MIN: usize = 1024;

/// An LZ77 token: either one literal byte, or a reference to `length`
/// bytes starting `offset` bytes into the window.
#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum Token {
    Literal(u8),
    Phrase { offset: u16, length: u16 }
}

enum Data<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>)
}

impl<'a> Data<'a> {
    fn bytes(&self) -> &[u8] {
        match self {
            Data::Borrowed(data) => data,
            Data::Owned(data) => data
        }
    }
}

/// Uncompressed input: produces the token stream for the codec.
pub struct InputWindow<'a> {
    rd: Option<Box<dyn Read + 'a>>,
    data: Data<'a>,
    /// one past the last valid byte in `data`
    end: usize,
    /// offset of the window within `data`
    window: usize,
    window_currsize: usize,
    window_maxsize: usize,
    /// offset of the look-ahead, always `window + window_currsize`
    lookahead: usize,
    lookahead_currsize: usize,
    lookahead_maxsize: usize,
    tree: MatchTree,
    lengths: LengthCode,
    processed_bytes: u64
}

impl<'a> InputWindow<'a> {
    pub fn from_slice(data: &'a [u8], opts: &Options) -> Result<Self,Error> {
        opts.validate()?;
        Ok(Self {
            rd: None,
            end: data.len(),
            data: Data::Borrowed(data),
            window: 0,
            window_currsize: 0,
            window_maxsize: opts.window_size as usize,
            lookahead: 0,
            lookahead_currsize: 0,
            lookahead_maxsize: opts.lookahead_size as usize,
            tree: MatchTree::create(opts.window_size as usize),
            lengths: LengthCode::create(opts.min_match_length(),opts.lookahead_size),
            processed_bytes: 0
        })
    }
    pub fn from_reader<R: Read + 'a>(rd: &'a mut R, opts: &Options) -> Result<Self,Error> {
        opts.validate()?;
        // Reading a few bytes at a time would work with a buffer of
        // exactly W+L; the factor of 10 just batches the refills.
        let size = (opts.window_size as usize + opts.lookahead_size as usize) * 10;
        let mut buf = Vec::new();
        if buf.try_reserve_exact(size).is_err() {
            return Err(Error::OutOfMemory);
        }
        buf.resize(size,0);
        Ok(Self {
            rd: Some(Box::new(rd)),
            data: Data::Owned(buf),
            end: 0,
            window: 0,
            window_currsize: 0,
            window_maxsize: opts.window_size as usize,
            lookahead: 0,
            lookahead_currsize: 0,
            lookahead_maxsize: opts.lookahead_size as usize,
            tree: MatchTree::create(opts.window_size as usize),
            lengths: LengthCode::create(opts.min_match_length(),opts.lookahead_size),
            processed_bytes: 0
        })
    }
    /// Fill the look-ahead for the first time.
    pub fn open(&mut self) -> Result<(),Error> {
        if let (Some(rd),Data::Owned(buf)) = (&mut self.rd, &mut self.data) {
            self.end = read_to_fill(rd.as_mut(),buf)?;
        }
        self.lookahead_currsize = self.end.min(self.lookahead_maxsize);
        Ok(())
    }
    pub(crate) fn options(&self) -> Options {
        Options {
            window_size: self.window_maxsize as u16,
            lookahead_size: self.lookahead_maxsize as u16
        }
    }
    pub(crate) fn lengths(&self) -> &LengthCode {
        &self.lengths
    }
    /// total bytes consumed from the input
    pub fn processed_bytes(&self) -> u64 {
        self.processed_bytes
    }
    /// size of the backing memory in bytes, unknown for reader sources
    pub fn total_bytes(&self) -> Option<u64> {
        match &self.data {
            Data::Borrowed(data) => Some(data.len() as u64),
            Data::Owned(_) => None
        }
    }
    /// Produce the next token and consume the bytes it covers, or `None`
    /// at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>,Error> {
        if self.lookahead_currsize == 0 {
            return Ok(None);
        }
        let curr = (self.lookahead % self.window_maxsize) as u16;
        let (length,offset) = match self.window_currsize {
            // the very first byte has nothing to match against; it seeds
            // the tree as the sentinel's sole child
            0 => {
                self.tree.seed(curr);
                (0,0)
            },
            _ => self.find_and_insert(curr)
        };
        let count;
        let token;
        if length == 0 || !self.lengths.can_encode(length) {
            count = 1;
            token = Token::Literal(self.data.bytes()[self.lookahead]);
        } else {
            count = length as usize;
            token = Token::Phrase { offset, length };
        }
        debug_assert!(count <= self.lookahead_currsize);
        self.advance(count)?;
        self.processed_bytes += count as u64;
        Ok(Some(token))
    }
    /// Walk the tree comparing the look-ahead against each candidate
    /// window position, recording the longest common prefix seen.  The
    /// walk always ends by indexing position `curr`: grafted in place of
    /// an identical node, or attached at the dead end the comparisons
    /// led to.  Returns (length, offset) of the best match.
    fn find_and_insert(&mut self, curr: u16) -> (u16,u16) {
        let w = self.window_maxsize;
        let begin = self.window % w;
        let look = self.lookahead;
        let look_len = self.lookahead_currsize;
        let base = self.window;
        let mut test = self.tree.root();
        let mut longest = 0;
        let mut offset = 0;
        loop {
            let k = (test as usize + w - begin) % w;
            let mut matched = 0;
            let mut delta: i32 = 0;
            {
                let data = self.data.bytes();
                while matched < look_len {
                    delta = data[look + matched] as i32 - data[base + k + matched] as i32;
                    if delta != 0 {
                        break;
                    }
                    matched += 1;
                }
            }
            if matched > longest {
                offset = k as u16;
                longest = matched;
                if matched == look_len {
                    // the whole look-ahead matched; the tree holds no
                    // duplicates, so the old node gives way to curr
                    if test != curr {
                        self.tree.delete(curr);
                        self.tree.replace(test,curr);
                    }
                    break;
                }
            }
            debug_assert!(delta != 0 || look_len == 0);
            let side = match delta > 0 {
                true => Side::Larger,
                false => Side::Smaller
            };
            let mut child = self.tree.child(test,side);
            if child == UNUSED {
                if test == curr {
                    break;
                }
                self.tree.delete(curr);
                // deleting curr may have promoted some node into the
                // slot we were about to take
                child = self.tree.child(test,side);
                if child == UNUSED {
                    self.tree.attach(test,side,curr);
                    break;
                }
            }
            test = child;
        }
        (longest as u16,offset)
    }
    /// Slide the window and the look-ahead over `count` consumed bytes,
    /// keeping the tree synchronized: ahead of each step the stale node
    /// at the slot being reused is dropped, and after each step the new
    /// look-ahead position is indexed (the final position was already
    /// indexed by the search).
    fn advance(&mut self, count: usize) -> Result<(),Error> {
        for i in 0..count {
            if i < count - 1 {
                let stale = ((self.lookahead + 1) % self.window_maxsize) as u16;
                self.tree.delete(stale);
            }
            if self.window_currsize == self.window_maxsize {
                self.window += 1;
            } else {
                self.window_currsize += 1;
            }
            self.lookahead += 1;
            debug_assert!(self.window + self.window_currsize == self.lookahead);
            if self.lookahead + self.lookahead_currsize > self.end {
                debug_assert!(self.lookahead + self.lookahead_currsize == self.end + 1);
                // Once the look-ahead starts shrinking the input is known
                // to be exhausted, so only a full look-ahead refills.
                let eof = self.lookahead_currsize < self.lookahead_maxsize;
                let can_move = self.window > 0;
                if self.rd.is_some() && !eof && can_move {
                    self.compact_and_refill()?;
                } else {
                    self.lookahead_currsize -= 1;
                }
            }
            if i < count - 1 {
                let curr = (self.lookahead % self.window_maxsize) as u16;
                self.find_and_insert(curr);
            }
        }
        Ok(())
    }
    /// Move the resident window and look-ahead back to the front of the
    /// buffer, refill behind them, and re-map the tree onto the new
    /// positions.
    fn compact_and_refill(&mut self) -> Result<(),Error> {
        debug_assert!(self.window_currsize == self.window_maxsize);
        let lookah_size = self.end - self.lookahead;
        let resident = self.window_maxsize + lookah_size;
        let shift = self.window % self.window_maxsize;
        let count = match (&mut self.rd, &mut self.data) {
            (Some(rd),Data::Owned(buf)) => {
                buf.copy_within(self.window..self.window + resident,0);
                read_to_fill(rd.as_mut(),&mut buf[resident..])?
            },
            _ => panic!("compacting a borrowed buffer")
        };
        log::debug!("compacted {} bytes of window slide, refilled {}",self.window,count);
        self.tree.reindex(shift);
        self.window = 0;
        self.lookahead = self.window_maxsize;
        self.end = resident + count;
        self.lookahead_currsize = (lookah_size + count).min(self.lookahead_maxsize);
        Ok(())
    }
}

enum RawDest<'a> {
    Memory { buf: Vec<u8>, size: usize, can_grow: bool },
    Writer { wr: Box<dyn Write + 'a>, buf: Vec<u8> }
}

/// Uncompressed output: reconstructs bytes from the token stream.
pub struct OutputWindow<'a> {
    dest: RawDest<'a>,
    /// one past the last byte produced, within the current buffer
    end: usize,
    /// offset of the window within the buffer
    window: usize,
    window_currsize: usize,
    window_maxsize: usize,
    processed_bytes: u64
}

impl<'a> OutputWindow<'a> {
    /// A sink over an owned buffer, initially allowed `capacity` bytes.
    /// When `can_grow` is false the capacity is a hard limit, so it must
    /// not be zero.
    pub fn to_memory(capacity: usize, can_grow: bool) -> Result<Self,Error> {
        if capacity == 0 && !can_grow {
            log::error!("a fixed memory sink needs a nonzero capacity");
            return Err(Error::InvalidArgument("memory sink can never be written"));
        }
        let mut buf = Vec::new();
        if buf.try_reserve_exact(capacity).is_err() {
            return Err(Error::OutOfMemory);
        }
        buf.resize(capacity,0);
        Ok(Self {
            dest: RawDest::Memory { buf, size: capacity, can_grow },
            end: 0,
            window: 0,
            window_currsize: 0,
            window_maxsize: 0,
            processed_bytes: 0
        })
    }
    pub fn to_writer<W: Write + 'a>(wr: &'a mut W) -> Self {
        Self {
            dest: RawDest::Writer { wr: Box::new(wr), buf: Vec::new() },
            end: 0,
            window: 0,
            window_currsize: 0,
            window_maxsize: 0,
            processed_bytes: 0
        }
    }
    /// Adopt the sizes recovered from the header and allocate the
    /// writer-side buffer.
    pub fn open(&mut self, opts: &Options) -> Result<(),Error> {
        self.window_maxsize = opts.window_size as usize;
        if let RawDest::Writer { buf, .. } = &mut self.dest {
            let size = self.window_maxsize * 10;
            if buf.try_reserve_exact(size).is_err() {
                return Err(Error::OutOfMemory);
            }
            buf.resize(size,0);
        }
        Ok(())
    }
    /// total bytes written to the output
    pub fn processed_bytes(&self) -> u64 {
        self.processed_bytes
    }
    /// bytes the memory sink may currently occupy, unknown for writer sinks
    pub fn capacity(&self) -> Option<usize> {
        match &self.dest {
            RawDest::Memory { size, .. } => Some(*size),
            RawDest::Writer { .. } => None
        }
    }
    /// Append the bytes of one token, sliding the window over them.
    pub fn save(&mut self, token: Token) -> Result<(),Error> {
        let count = match token {
            Token::Literal(_) => 1,
            Token::Phrase { offset, length } => {
                if length == 0 || (offset as usize) >= self.window_currsize {
                    log::error!("phrase token points outside the window");
                    return Err(Error::InvalidFormat);
                }
                length as usize
            }
        };
        self.make_room(count)?;
        let end = self.end;
        let window = self.window;
        let buf = match &mut self.dest {
            RawDest::Memory { buf, .. } => buf,
            RawDest::Writer { buf, .. } => buf
        };
        match token {
            Token::Literal(next) => {
                buf[end] = next;
            },
            Token::Phrase { offset, .. } => {
                let src = window + offset as usize;
                if src + count <= end {
                    buf.copy_within(src..src + count,end);
                } else {
                    // Overlapping run: go one byte at a time, exactly so
                    // that a match extending past the window boundary
                    // picks up the bytes it just produced.
                    for i in 0..count {
                        buf[end + i] = buf[src + i];
                    }
                }
            }
        }
        if self.window_currsize == self.window_maxsize {
            self.window += count;
        } else {
            let room = self.window_maxsize - self.window_currsize;
            if count <= room {
                self.window_currsize += count;
            } else {
                self.window_currsize = self.window_maxsize;
                self.window += count - room;
            }
        }
        self.end += count;
        self.processed_bytes += count as u64;
        Ok(())
    }
    /// Make the buffer able to take `count` more bytes: grow a memory
    /// sink, or drain everything ahead of the window to the writer and
    /// slide the resident window back to the front.
    fn make_room(&mut self, count: usize) -> Result<(),Error> {
        match &mut self.dest {
            RawDest::Memory { buf, size, can_grow } => {
                if self.end + count > *size {
                    if !*can_grow {
                        log::error!("expanded output exceeds the supplied buffer");
                        return Err(Error::OutOfSpace);
                    }
                    let new_size = (self.end + count).max(GROW_MIN).max(*size * 11 / 10);
                    if buf.try_reserve_exact(new_size - buf.len()).is_err() {
                        return Err(Error::OutOfMemory);
                    }
                    buf.resize(new_size,0);
                    *size = new_size;
                }
            },
            RawDest::Writer { wr, buf } => {
                if self.end + count > buf.len() {
                    debug_assert!(self.window_currsize == self.window_maxsize);
                    wr.write_all(&buf[0..self.window])?;
                    buf.copy_within(self.window..self.window + self.window_maxsize,0);
                    self.end = self.window_maxsize;
                    self.window = 0;
                }
            }
        }
        Ok(())
    }
    /// Drain whatever the buffer still holds to the writer.
    pub fn close(&mut self) -> Result<(),Error> {
        if let RawDest::Writer { wr, buf } = &mut self.dest {
            wr.write_all(&buf[0..self.end])?;
            wr.flush()?;
            self.end = 0;
            self.window = 0;
            self.window_currsize = 0;
        }
        Ok(())
    }
    /// recover the buffer of a memory sink, truncated to the bytes produced
    pub fn into_buffer(self) -> Option<Vec<u8>> {
        match self.dest {
            RawDest::Memory { mut buf, .. } => {
                buf.truncate(self.end);
                Some(buf)
            },
            RawDest::Writer { .. } => None
        }
    }
}

#[cfg(test)]
fn collect_tokens(data: &[u8], opts: &Options) -> Vec<Token> {
    let mut input = InputWindow::from_slice(data,opts).expect("create failed");
    input.open().expect("open failed");
    let mut tokens = Vec::new();
    while let Some(token) = input.next_token().expect("tokenize failed") {
        tokens.push(token);
    }
    assert_eq!(input.processed_bytes(),data.len() as u64);
    tokens
}

#[cfg(test)]
fn replay_tokens(tokens: &[Token], opts: &Options) -> Vec<u8> {
    let mut output = OutputWindow::to_memory(0,true).expect("create failed");
    output.open(opts).expect("open failed");
    for token in tokens {
        output.save(*token).expect("save failed");
    }
    output.into_buffer().unwrap()
}

#[cfg(test)]
fn lcg_bytes(count: usize, mut state: u64) -> Vec<u8> {
    let mut ans = Vec::new();
    for _i in 0..count {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ans.push((state >> 33) as u8);
    }
    ans
}

#[test]
fn tokens_for_repeated_input() {
    let opts = Options { window_size: 4, lookahead_size: 2 };
    let tokens = collect_tokens(b"AAAAAA",&opts);
    assert_eq!(tokens,vec![
        Token::Literal(b'A'),
        Token::Phrase { offset: 0, length: 2 },
        Token::Phrase { offset: 2, length: 2 },
        Token::Phrase { offset: 3, length: 1 },
    ]);
}

#[test]
fn window_roundtrip() {
    let opts = Options { window_size: 4, lookahead_size: 2 };
    for data in [&b"BBAAABBC"[..],&b"AAABBCAB"[..],&b"ABCD"[..]] {
        let tokens = collect_tokens(data,&opts);
        assert_eq!(replay_tokens(&tokens,&opts),data);
    }
    let opts = Options { window_size: 16, lookahead_size: 8 };
    let data = lcg_bytes(300,7);
    let tokens = collect_tokens(&data,&opts);
    assert_eq!(replay_tokens(&tokens,&opts),data);
}

#[test]
fn reader_compaction_matches_slice() {
    // a buffer of (32+8)*10 bytes against 4000 bytes of input forces
    // several compactions and tree re-indexings
    let opts = Options { window_size: 32, lookahead_size: 8 };
    let data: Vec<u8> = lcg_bytes(4000,99).iter().map(|b| b % 7).collect();
    let expected = collect_tokens(&data,&opts);
    let mut cursor = std::io::Cursor::new(&data);
    let mut input = InputWindow::from_reader(&mut cursor,&opts).expect("create failed");
    input.open().expect("open failed");
    let mut tokens = Vec::new();
    while let Some(token) = input.next_token().expect("tokenize failed") {
        tokens.push(token);
    }
    assert_eq!(tokens,expected);
    assert_eq!(replay_tokens(&tokens,&opts),data);
}

#[test]
fn output_overlap_extends_the_window() {
    let opts = Options { window_size: 8, lookahead_size: 6 };
    let mut output = OutputWindow::to_memory(0,true).expect("create failed");
    output.open(&opts).expect("open failed");
    output.save(Token::Literal(b'A')).expect("save failed");
    output.save(Token::Phrase { offset: 0, length: 5 }).expect("save failed");
    assert_eq!(output.into_buffer().unwrap(),b"AAAAAA");
}

#[test]
fn bad_phrases_are_rejected() {
    let opts = Options { window_size: 8, lookahead_size: 6 };
    let mut output = OutputWindow::to_memory(0,true).expect("create failed");
    output.open(&opts).expect("open failed");
    // nothing in the window yet
    assert!(matches!(output.save(Token::Phrase { offset: 0, length: 1 }),Err(Error::InvalidFormat)));
    output.save(Token::Literal(b'A')).expect("save failed");
    assert!(matches!(output.save(Token::Phrase { offset: 1, length: 1 }),Err(Error::InvalidFormat)));
}

#[test]
fn fixed_output_refuses_overflow() {
    assert!(OutputWindow::to_memory(0,false).is_err());
    let opts = Options { window_size: 8, lookahead_size: 6 };
    let mut output = OutputWindow::to_memory(2,false).expect("create failed");
    output.open(&opts).expect("open failed");
    output.save(Token::Literal(b'A')).expect("save failed");
    output.save(Token::Literal(b'B')).expect("save failed");
    assert!(matches!(output.save(Token::Literal(b'C')),Err(Error::OutOfSpace)));
}

#[test]
fn writer_output_matches_memory() {
    let opts = Options { window_size: 8, lookahead_size: 6 };
    let data = lcg_bytes(600,3).iter().map(|b| b % 5).collect::<Vec<u8>>();
    let tokens = collect_tokens(&data,&opts);
    let mut sink = Vec::new();
    {
        let mut output = OutputWindow::to_writer(&mut sink);
        output.open(&opts).expect("open failed");
        for token in &tokens {
            output.save(*token).expect("save failed");
        }
        output.close().expect("close failed");
    }
    assert_eq!(sink,data);
}
