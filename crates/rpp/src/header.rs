//! Binary header stored as the first payload chunk of a plugin block.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! id:u32  magic:[u8;4]
//! n_in:u32   n_in  x 8-byte channel mask
//! n_out:u32  n_out x 8-byte channel mask
//! state_size:u32  footer:[u8;8]
//! ```
//!
//! The id is conventionally written big-endian when shown as ASCII or hex
//! (`dfr2`, `64667232`), so its first four header bytes read `2rfd`.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{EncodingError, Error, Result};
use crate::node::{Chunk, Node};

/// Magic of a VST2-style header.
pub const MAGIC_VST2: [u8; 4] = [0xEE, 0x5E, 0xED, 0xFE];
/// Magic of a VST3-style header.
pub const MAGIC_VST3: [u8; 4] = [0xEF, 0x5E, 0xED, 0xFE];
/// Footer written by [`PluginHeader::new`].
pub const DEFAULT_FOOTER: [u8; 8] = [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00];

const MASK_BYTES: usize = 8;

/// A plugin identifier with ASCII, hex and numeric views of one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(u32);

impl PluginId {
    pub fn from_u32(id: u32) -> Self {
        PluginId(id)
    }

    /// Four ASCII characters read big-endian: `"dfr2"` is `0x64667232`.
    pub fn from_ascii(text: &str) -> Result<Self> {
        let bytes: [u8; 4] = text
            .as_bytes()
            .try_into()
            .ok()
            .filter(|_| text.is_ascii())
            .ok_or_else(|| EncodingError::InvalidPluginId(text.to_string()))?;
        Ok(PluginId(u32::from_be_bytes(bytes)))
    }

    /// Eight hex digits, most significant first.
    pub fn from_hex(text: &str) -> Result<Self> {
        if text.len() != 8 {
            return Err(EncodingError::InvalidPluginId(text.to_string()).into());
        }
        u32::from_str_radix(text, 16)
            .map(PluginId)
            .map_err(|_| EncodingError::InvalidPluginId(text.to_string()).into())
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// The ASCII view, when all four bytes are printable.
    pub fn to_ascii(self) -> Option<String> {
        let bytes = self.0.to_be_bytes();
        bytes
            .iter()
            .all(|b| b.is_ascii_graphic() || *b == b' ')
            .then(|| bytes.iter().map(|b| *b as char).collect())
    }

    pub fn to_hex(self) -> String {
        format!("{:08x}", self.0)
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_ascii() {
            Some(ascii) => f.write_str(&ascii),
            None => f.write_str(&self.to_hex()),
        }
    }
}

impl From<u32> for PluginId {
    fn from(id: u32) -> Self {
        PluginId(id)
    }
}

/// The channels one plugin pin is connected to; bit `i` is channel `i`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMask(u64);

impl ChannelMask {
    pub const MAX_CHANNELS: usize = 64;

    pub fn from_bits(bits: u64) -> Self {
        ChannelMask(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// A mask with only `channel` set.
    pub fn single(channel: usize) -> Result<Self> {
        let mut mask = ChannelMask::default();
        mask.set(channel, true)?;
        Ok(mask)
    }

    pub fn contains(self, channel: usize) -> bool {
        channel < Self::MAX_CHANNELS && self.0 & (1 << channel) != 0
    }

    pub fn set(&mut self, channel: usize, on: bool) -> Result<()> {
        if channel >= Self::MAX_CHANNELS {
            return Err(Error::Logic(format!(
                "channel {channel} does not fit an {}-byte mask",
                MASK_BYTES
            )));
        }
        if on {
            self.0 |= 1 << channel;
        } else {
            self.0 &= !(1 << channel);
        }
        Ok(())
    }

    pub fn channels(self) -> impl Iterator<Item = usize> {
        (0..Self::MAX_CHANNELS).filter(move |c| self.contains(*c))
    }

    /// Bit `i` lives at byte `i / 8`, position `i % 8`.
    pub fn to_bytes(self) -> [u8; MASK_BYTES] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: [u8; MASK_BYTES]) -> Self {
        ChannelMask(u64::from_le_bytes(bytes))
    }
}

/// Structured form of a plugin block's first payload chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginHeader {
    pub id: PluginId,
    pub magic: [u8; 4],
    pub inputs: Vec<ChannelMask>,
    pub outputs: Vec<ChannelMask>,
    pub state_size: u32,
    pub footer: [u8; 8],
}

impl PluginHeader {
    /// A header routing input pin `k` to channel `k` and output pin `k` to channel `k`.
    pub fn new(id: PluginId, num_in: usize, num_out: usize) -> Result<Self> {
        let pins = |n: usize| (0..n).map(ChannelMask::single).collect::<Result<Vec<_>>>();
        Ok(PluginHeader {
            id,
            magic: MAGIC_VST2,
            inputs: pins(num_in)?,
            outputs: pins(num_out)?,
            state_size: 0,
            footer: DEFAULT_FOOTER,
        })
    }

    pub fn num_in(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_out(&self) -> usize {
        self.outputs.len()
    }

    pub fn encoded_len(&self) -> usize {
        4 + 4 + 4 + MASK_BYTES * self.inputs.len() + 4 + MASK_BYTES * self.outputs.len() + 4 + 8
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.id.as_u32().to_le_bytes());
        out.extend_from_slice(&self.magic);
        for pins in [&self.inputs, &self.outputs] {
            out.extend_from_slice(&(pins.len() as u32).to_le_bytes());
            for mask in pins {
                out.extend_from_slice(&mask.to_bytes());
            }
        }
        out.extend_from_slice(&self.state_size.to_le_bytes());
        out.extend_from_slice(&self.footer);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let id = PluginId(u32::from_le_bytes(reader.array()?));
        let magic: [u8; 4] = reader.array()?;
        if magic != MAGIC_VST2 && magic != MAGIC_VST3 {
            return Err(EncodingError::BadMagic {
                found: magic,
                expected: MAGIC_VST2,
            }
            .into());
        }
        let inputs = reader.masks()?;
        let outputs = reader.masks()?;
        let state_size = u32::from_le_bytes(reader.array()?);
        let footer: [u8; 8] = reader.array()?;
        if reader.remaining() > 0 {
            return Err(EncodingError::TrailingBytes(reader.remaining()).into());
        }
        Ok(PluginHeader {
            id,
            magic,
            inputs,
            outputs,
            state_size,
            footer,
        })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(text: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| EncodingError::InvalidBase64(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(EncodingError::TruncatedHeader {
                needed: self.pos + n,
                available: self.bytes.len(),
            }
            .into());
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn masks(&mut self) -> Result<Vec<ChannelMask>> {
        let count = u32::from_le_bytes(self.array()?) as usize;
        // the count is untrusted; bound it by what is left before allocating
        let needed = count.saturating_mul(MASK_BYTES);
        if needed > self.remaining() {
            return Err(EncodingError::TruncatedHeader {
                needed: self.pos.saturating_add(needed),
                available: self.bytes.len(),
            }
            .into());
        }
        (0..count)
            .map(|_| self.array().map(ChannelMask::from_bytes))
            .collect()
    }
}

impl Node {
    /// Decode the first payload chunk as a plugin header.
    ///
    /// Returns `Ok(None)` when the node has no payload.
    pub fn plugin_header(&self) -> Result<Option<PluginHeader>> {
        match self.chunks.first() {
            None => Ok(None),
            Some(Chunk::Header(h)) => Ok(Some(h.clone())),
            Some(Chunk::Base64(text)) => PluginHeader::from_base64(text).map(Some),
        }
    }

    /// Replace the first payload chunk with `header`, or insert it when
    /// the node has no payload yet.
    pub fn set_plugin_header(&mut self, header: PluginHeader) {
        match self.chunks.first_mut() {
            Some(first) => *first = Chunk::Header(header),
            None => self.chunks.push(Chunk::Header(header)),
        }
    }
}
