//! Baseline JPEG decoder with scaled reconstruction.
//!
//! Decodes baseline (SOF0) JPEG images into raw pixel data: grayscale,
//! YCbCr converted to RGB, or CMYK passed through as stored. The caller
//! picks a scaled size N in 1..=8 and every 8x8 coefficient block is
//! reconstructed as an NxN pixel block by the scaled inverse DCT, so the
//! decoded image is about N/8 of the encoded dimensions without a
//! resampling pass.

use super::bit_reader::MsbBitReader;
use super::idct::{idct, DCTSIZE};
use crate::color::ColorType;
use crate::error::{Error, Result};

/// JPEG markers.
const SOI: u8 = 0xD8; // Start of Image
const EOI: u8 = 0xD9; // End of Image
const SOF0: u8 = 0xC0; // Baseline DCT
const SOF2: u8 = 0xC2; // Progressive DCT
const DHT: u8 = 0xC4; // Define Huffman Table
const DQT: u8 = 0xDB; // Define Quantization Table
const DRI: u8 = 0xDD; // Define Restart Interval
const SOS: u8 = 0xDA; // Start of Scan
const RST0: u8 = 0xD0; // Restart marker 0
const APP0: u8 = 0xE0; // Application segment 0 (JFIF)
const APP15: u8 = 0xEF; // Application segment 15
const COM: u8 = 0xFE; // Comment

/// Zig-zag position to natural (row-major) position. The inverse of the
/// quantization-side map: entropy-coded coefficients arrive in zig-zag
/// order and are scattered into natural order as they are read.
const UNZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Decoded JPEG image.
#[derive(Debug)]
pub struct JpegImage {
    /// Image width in pixels (scaled).
    pub width: u32,
    /// Image height in pixels (scaled).
    pub height: u32,
    /// Raw pixel data (grayscale, RGB, or CMYK).
    pub pixels: Vec<u8>,
    /// Color type of the decoded image.
    pub color_type: ColorType,
}

/// Image parameters read from the frame header, without decoding scan
/// data. Dimensions are the full encoded resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegConfig {
    /// Encoded image width in pixels.
    pub width: u32,
    /// Encoded image height in pixels.
    pub height: u32,
    /// Color type a decode would produce.
    pub color_type: ColorType,
}

/// Frame component information.
#[derive(Debug, Clone, Default)]
struct Component {
    #[allow(dead_code)]
    id: u8,
    h_sampling: u8,
    v_sampling: u8,
    quant_table_id: u8,
    dc_table_id: u8,
    ac_table_id: u8,
}

/// Huffman decoding table.
struct HuffmanTable {
    /// Fast lookup table (256 entries for 8-bit lookahead).
    lookup: [u16; 256],
    /// Values for each code.
    values: Vec<u8>,
    /// Highest code for each bit length, -1 where no codes exist.
    max_code: [i32; 17],
    /// Value offset for each bit length.
    val_offset: [i32; 17],
}

impl Default for HuffmanTable {
    fn default() -> Self {
        Self {
            lookup: [0; 256],
            values: Vec::new(),
            max_code: [-1; 17],
            val_offset: [0; 17],
        }
    }
}

impl HuffmanTable {
    /// Build a Huffman table from DHT bits and values.
    ///
    /// Codes are canonical: consecutive within a bit length, and each
    /// length continues from the previous length's last code shifted
    /// left. One running code counter therefore yields the fast lookup,
    /// the per-length code ceiling, and the value offsets in a single
    /// pass.
    fn build(bits: &[u8; 16], values: &[u8]) -> Self {
        let mut table = HuffmanTable {
            values: values.to_vec(),
            ..Default::default()
        };

        let mut code = 0i32;
        let mut val_idx = 0usize;
        for len in 1..=16usize {
            let count = bits[len - 1] as usize;
            if count == 0 {
                code <<= 1;
                continue;
            }
            table.val_offset[len] = val_idx as i32 - code;

            for _ in 0..count {
                // Codes of at most 8 bits fill every 8-bit window they
                // prefix in the fast lookup.
                if len <= 8 {
                    let val = table.values.get(val_idx).copied().unwrap_or(0);
                    let fill = 8 - len;
                    let base = (code as usize) << fill;
                    for window in base..base + (1 << fill) {
                        if window < 256 {
                            table.lookup[window] = (val as u16) | ((len as u16) << 8);
                        }
                    }
                }
                code += 1;
                val_idx += 1;
            }

            table.max_code[len] = code - 1;
            code <<= 1;
        }

        table
    }

    /// Decode one symbol from the bit stream.
    fn decode(&self, reader: &mut MsbBitReader) -> Result<u8> {
        if let Ok(peek) = reader.peek_bits(8) {
            let entry = self.lookup[peek as usize];
            let len = (entry >> 8) as u8;
            if len > 0 && len <= 8 {
                reader.consume(len);
                return Ok((entry & 0xFF) as u8);
            }
        }

        self.decode_slow(reader)
    }

    fn decode_slow(&self, reader: &mut MsbBitReader) -> Result<u8> {
        let mut code = 0i32;
        for len in 1..=16 {
            code = (code << 1) | reader.read_bits(1)? as i32;
            if code <= self.max_code[len] {
                return self
                    .values
                    .get((code + self.val_offset[len]) as usize)
                    .copied()
                    .ok_or_else(|| Error::InvalidDecode("invalid Huffman code".into()));
            }
        }
        Err(Error::InvalidDecode("Huffman code longer than 16 bits".into()))
    }
}

/// JPEG decoder state.
struct JpegDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    width: u32,
    height: u32,
    components: Vec<Component>,
    quant_tables: [[i32; 64]; 4],
    dc_tables: [HuffmanTable; 4],
    ac_tables: [HuffmanTable; 4],
    restart_interval: u16,
    max_h_sampling: u8,
    max_v_sampling: u8,
}

impl<'a> JpegDecoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            width: 0,
            height: 0,
            components: Vec::new(),
            quant_tables: [[0; 64]; 4],
            dc_tables: Default::default(),
            ac_tables: Default::default(),
            restart_interval: 0,
            max_h_sampling: 1,
            max_v_sampling: 1,
        }
    }

    fn check_soi(&mut self) -> Result<()> {
        if self.data.len() < 2 || self.data[0] != 0xFF || self.data[1] != SOI {
            return Err(Error::InvalidDecode("not a JPEG file".into()));
        }
        self.pos = 2;
        Ok(())
    }

    fn decode(mut self, scaled_size: u8) -> Result<JpegImage> {
        self.check_soi()?;

        loop {
            let (marker, segment) = self.read_marker()?;

            match marker {
                SOF0 => self.parse_sof0(segment)?,
                SOF2 => {
                    return Err(Error::UnsupportedDecode(
                        "progressive JPEG not supported".into(),
                    ))
                }
                0xC1 | 0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                    return Err(Error::UnsupportedDecode(format!(
                        "SOF marker 0x{marker:02X} not supported"
                    )))
                }
                DHT => self.parse_dht(segment)?,
                DQT => self.parse_dqt(segment)?,
                DRI => self.parse_dri(segment)?,
                SOS => {
                    self.parse_sos(segment)?;
                    let image = self.decode_scan(scaled_size)?;
                    return Ok(image);
                }
                EOI => break,
                APP0..=APP15 | COM => {
                    // Skip application data and comments.
                }
                _ => {
                    // Skip unknown markers.
                }
            }
        }

        Err(Error::InvalidDecode("no image data found".into()))
    }

    fn read_config(mut self) -> Result<JpegConfig> {
        self.check_soi()?;

        loop {
            let (marker, segment) = self.read_marker()?;

            match marker {
                SOF0 => {
                    self.parse_sof0(segment)?;
                    let color_type = match self.components.len() {
                        1 => ColorType::Gray,
                        4 => ColorType::Cmyk,
                        _ => ColorType::Rgb,
                    };
                    return Ok(JpegConfig {
                        width: self.width,
                        height: self.height,
                        color_type,
                    });
                }
                SOF2 => {
                    return Err(Error::UnsupportedDecode(
                        "progressive JPEG not supported".into(),
                    ))
                }
                0xC1 | 0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                    return Err(Error::UnsupportedDecode(format!(
                        "SOF marker 0x{marker:02X} not supported"
                    )))
                }
                SOS | EOI => {
                    return Err(Error::InvalidDecode("missing frame header".into()))
                }
                _ => {}
            }
        }
    }

    /// Read the next marker and borrow its payload from the input; only
    /// the scan data that follows SOS is consumed elsewhere.
    fn read_marker(&mut self) -> Result<(u8, &'a [u8])> {
        // Find the next marker.
        while self.pos < self.data.len() && self.data[self.pos] != 0xFF {
            self.pos += 1;
        }

        // Skip padding 0xFF bytes.
        while self.pos < self.data.len() && self.data[self.pos] == 0xFF {
            self.pos += 1;
        }

        if self.pos >= self.data.len() {
            return Err(Error::InvalidDecode("unexpected end of file".into()));
        }

        let marker = self.data[self.pos];
        self.pos += 1;

        // Markers without payload.
        match marker {
            SOI | EOI | RST0..=0xD7 => return Ok((marker, &[])),
            _ => {}
        }

        if self.pos + 2 > self.data.len() {
            return Err(Error::InvalidDecode("truncated marker".into()));
        }
        let length = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]) as usize;
        self.pos += 2;

        if length < 2 || self.pos + length - 2 > self.data.len() {
            return Err(Error::InvalidDecode("invalid marker length".into()));
        }

        let segment = &self.data[self.pos..self.pos + length - 2];
        self.pos += length - 2;

        Ok((marker, segment))
    }

    fn parse_sof0(&mut self, segment: &[u8]) -> Result<()> {
        if segment.len() < 8 {
            return Err(Error::InvalidDecode("invalid SOF0 length".into()));
        }

        let precision = segment[0];
        if precision != 8 {
            return Err(Error::UnsupportedDecode(format!(
                "{precision}-bit precision not supported"
            )));
        }

        self.height = u16::from_be_bytes([segment[1], segment[2]]) as u32;
        self.width = u16::from_be_bytes([segment[3], segment[4]]) as u32;
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidDecode("zero image dimension".into()));
        }

        let num_components = segment[5] as usize;
        if num_components != 1 && num_components != 3 && num_components != 4 {
            return Err(Error::UnsupportedDecode(format!(
                "{num_components} components not supported"
            )));
        }

        if segment.len() < 6 + num_components * 3 {
            return Err(Error::InvalidDecode("truncated SOF0 components".into()));
        }

        self.components.clear();
        for i in 0..num_components {
            let offset = 6 + i * 3;
            let id = segment[offset];
            let sampling = segment[offset + 1];
            let h_sampling = (sampling >> 4) & 0x0F;
            let v_sampling = sampling & 0x0F;

            // Zero sampling factors would divide by zero later.
            if h_sampling == 0 || v_sampling == 0 {
                return Err(Error::InvalidDecode(format!(
                    "invalid sampling factors {h_sampling}x{v_sampling} for component {id}"
                )));
            }

            let quant_table_id = segment[offset + 2];
            if quant_table_id > 3 {
                return Err(Error::InvalidDecode(format!(
                    "invalid quantization table ID {quant_table_id} for component {id}"
                )));
            }

            self.max_h_sampling = self.max_h_sampling.max(h_sampling);
            self.max_v_sampling = self.max_v_sampling.max(v_sampling);

            self.components.push(Component {
                id,
                h_sampling,
                v_sampling,
                quant_table_id,
                ..Default::default()
            });
        }

        Ok(())
    }

    fn parse_dht(&mut self, segment: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < segment.len() {
            let info = segment[offset];
            let table_class = (info >> 4) & 0x0F; // 0 = DC, 1 = AC
            let table_id = (info & 0x0F) as usize;

            if table_id > 3 {
                return Err(Error::InvalidDecode("invalid Huffman table ID".into()));
            }

            offset += 1;
            if offset + 16 > segment.len() {
                return Err(Error::InvalidDecode("truncated DHT".into()));
            }

            let mut bits = [0u8; 16];
            bits.copy_from_slice(&segment[offset..offset + 16]);
            offset += 16;

            let num_values: usize = bits.iter().map(|&b| b as usize).sum();
            if offset + num_values > segment.len() {
                return Err(Error::InvalidDecode("truncated DHT values".into()));
            }

            let values = &segment[offset..offset + num_values];
            offset += num_values;

            let table = HuffmanTable::build(&bits, values);
            if table_class == 0 {
                self.dc_tables[table_id] = table;
            } else {
                self.ac_tables[table_id] = table;
            }
        }

        Ok(())
    }

    fn parse_dqt(&mut self, segment: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < segment.len() {
            let info = segment[offset];
            let precision = (info >> 4) & 0x0F;
            let table_id = (info & 0x0F) as usize;

            if table_id > 3 {
                return Err(Error::InvalidDecode("invalid quantization table ID".into()));
            }

            offset += 1;

            if precision == 0 {
                // 8-bit entries.
                if offset + 64 > segment.len() {
                    return Err(Error::InvalidDecode("truncated DQT".into()));
                }
                for i in 0..64 {
                    self.quant_tables[table_id][i] = segment[offset + i] as i32;
                }
                offset += 64;
            } else {
                // 16-bit entries.
                if offset + 128 > segment.len() {
                    return Err(Error::InvalidDecode("truncated DQT".into()));
                }
                for i in 0..64 {
                    self.quant_tables[table_id][i] =
                        u16::from_be_bytes([segment[offset + i * 2], segment[offset + i * 2 + 1]])
                            as i32;
                }
                offset += 128;
            }

            // A zero divisor never appears in valid streams and would
            // make the dequantized block meaningless.
            if self.quant_tables[table_id].contains(&0) {
                return Err(Error::InvalidDecode(format!(
                    "quantization table {table_id} contains a zero entry"
                )));
            }
        }

        Ok(())
    }

    fn parse_dri(&mut self, segment: &[u8]) -> Result<()> {
        if segment.len() != 2 {
            return Err(Error::InvalidDecode("invalid DRI length".into()));
        }

        self.restart_interval = u16::from_be_bytes([segment[0], segment[1]]);

        Ok(())
    }

    fn parse_sos(&mut self, segment: &[u8]) -> Result<()> {
        if segment.is_empty() {
            return Err(Error::InvalidDecode("empty SOS segment".into()));
        }
        if self.components.is_empty() {
            return Err(Error::InvalidDecode("SOS before frame header".into()));
        }

        let num_components = segment[0] as usize;
        if num_components != self.components.len() {
            return Err(Error::InvalidDecode("SOS component count mismatch".into()));
        }

        for i in 0..num_components {
            let offset = 1 + i * 2;
            if offset + 1 >= segment.len() {
                return Err(Error::InvalidDecode("truncated SOS segment".into()));
            }
            let component_id = segment[offset];
            let tables = segment[offset + 1];
            let dc_table_id = (tables >> 4) & 0x0F;
            let ac_table_id = tables & 0x0F;

            if dc_table_id > 3 {
                return Err(Error::InvalidDecode(format!(
                    "invalid DC Huffman table ID {dc_table_id} for component {component_id}"
                )));
            }
            if ac_table_id > 3 {
                return Err(Error::InvalidDecode(format!(
                    "invalid AC Huffman table ID {ac_table_id} for component {component_id}"
                )));
            }

            self.components[i].dc_table_id = dc_table_id;
            self.components[i].ac_table_id = ac_table_id;
        }

        Ok(())
    }

    fn decode_scan(&mut self, scaled_size: u8) -> Result<JpegImage> {
        let n = scaled_size as usize;

        // MCU grid is laid out at the encoded resolution; each block of
        // an MCU shrinks to n x n in the scaled planes.
        let mcu_width = (self.width as usize).div_ceil(self.max_h_sampling as usize * DCTSIZE);
        let mcu_height = (self.height as usize).div_ceil(self.max_v_sampling as usize * DCTSIZE);

        // Per-component sample planes, block-aligned at the scaled size.
        let mut comp_data: Vec<Vec<u8>> = self
            .components
            .iter()
            .map(|c| {
                let w = mcu_width * c.h_sampling as usize * n;
                let h = mcu_height * c.v_sampling as usize * n;
                vec![0u8; w * h]
            })
            .collect();

        let entropy_start = self.pos;
        let entropy_end = find_entropy_end(&self.data[entropy_start..]);
        let entropy_data = &self.data[entropy_start..entropy_start + entropy_end];

        let mut reader = MsbBitReader::new(entropy_data);
        let mut dc_pred = vec![0i32; self.components.len()];
        let mut mcu_count = 0u32;

        // An entropy error mid-scan (truncated file, corrupt data) ends
        // the loop; whatever was decoded so far is still returned.
        'mcu_loop: for mcu_y in 0..mcu_height {
            for mcu_x in 0..mcu_width {
                if self.restart_interval > 0
                    && mcu_count > 0
                    && mcu_count % self.restart_interval as u32 == 0
                {
                    // Restart boundary: entropy data before the marker is
                    // padded to a byte, the DC prediction chain restarts,
                    // and the bit reader skips the RST marker itself.
                    reader.align_to_byte();
                    dc_pred.fill(0);
                }

                for (comp_idx, comp) in self.components.iter().enumerate() {
                    let blocks_h = comp.h_sampling as usize;
                    let blocks_v = comp.v_sampling as usize;

                    for block_y in 0..blocks_v {
                        for block_x in 0..blocks_h {
                            let mut coeffs = [0i32; 64];

                            // DC coefficient: category, then the signed
                            // amplitude difference from the predictor.
                            let dc_table = &self.dc_tables[comp.dc_table_id as usize];
                            let category = match dc_table.decode(&mut reader) {
                                Ok(c) => c,
                                Err(_) => break 'mcu_loop,
                            };
                            if category > 11 {
                                // 8-bit precision bounds DC differences
                                // to 11 bits; larger categories mean the
                                // stream is corrupt.
                                break 'mcu_loop;
                            }
                            let diff = if category > 0 {
                                match read_amplitude(&mut reader, category) {
                                    Ok(a) => a,
                                    Err(_) => break 'mcu_loop,
                                }
                            } else {
                                0
                            };
                            dc_pred[comp_idx] = dc_pred[comp_idx].wrapping_add(diff);
                            coeffs[0] = dc_pred[comp_idx];

                            // AC coefficients, zig-zag order in the
                            // stream, scattered to natural order.
                            let ac_table = &self.ac_tables[comp.ac_table_id as usize];
                            let mut k = 1;
                            while k < 64 {
                                let symbol = match ac_table.decode(&mut reader) {
                                    Ok(s) => s,
                                    Err(_) => break 'mcu_loop,
                                };

                                if symbol == 0 {
                                    // EOB: remaining coefficients are zero.
                                    break;
                                }

                                let run = (symbol >> 4) & 0x0F;
                                let size = symbol & 0x0F;

                                if symbol == 0xF0 {
                                    // ZRL: skip 16 zeros.
                                    k += 16;
                                    continue;
                                }
                                if size > 10 {
                                    // AC amplitudes are at most 10 bits
                                    // at 8-bit precision.
                                    break 'mcu_loop;
                                }

                                k += run as usize;
                                if k >= 64 {
                                    break;
                                }

                                if size > 0 {
                                    let amp = match read_amplitude(&mut reader, size) {
                                        Ok(a) => a,
                                        Err(_) => break 'mcu_loop,
                                    };
                                    coeffs[UNZIGZAG[k]] = amp;
                                }
                                k += 1;
                            }

                            // Reconstruct in place at the scaled size and
                            // stitch the n x n block into the plane.
                            let quant = &self.quant_tables[comp.quant_table_id as usize];
                            idct(&mut coeffs, quant, scaled_size);

                            let comp_width = mcu_width * blocks_h * n;
                            let start_x = (mcu_x * blocks_h + block_x) * n;
                            let start_y = (mcu_y * blocks_v + block_y) * n;

                            for by in 0..n {
                                for bx in 0..n {
                                    let idx = (start_y + by) * comp_width + start_x + bx;
                                    if idx < comp_data[comp_idx].len() {
                                        comp_data[comp_idx][idx] = coeffs[by * n + bx] as u8;
                                    }
                                }
                            }
                        }
                    }
                }
                mcu_count += 1;
            }
        }

        let out_width = scaled_dim(self.width as usize, n);
        let out_height = scaled_dim(self.height as usize, n);

        match self.components.len() {
            1 => {
                // Grayscale: crop the block-aligned plane to the scaled
                // image dimensions.
                let comp_width = mcu_width * self.components[0].h_sampling as usize * n;
                let mut pixels = Vec::with_capacity(out_width * out_height);
                for y in 0..out_height {
                    for x in 0..out_width {
                        let idx = y * comp_width + x;
                        pixels.push(comp_data[0].get(idx).copied().unwrap_or(0));
                    }
                }
                Ok(JpegImage {
                    width: out_width as u32,
                    height: out_height as u32,
                    pixels,
                    color_type: ColorType::Gray,
                })
            }
            4 => {
                // CMYK passes through un-matrixed: the four channels are
                // upsampled to the scaled grid and interleaved as stored.
                let pixels = interleave_cmyk(
                    &comp_data,
                    out_width,
                    out_height,
                    &self.components,
                    self.max_h_sampling,
                    self.max_v_sampling,
                    mcu_width,
                    n,
                );
                Ok(JpegImage {
                    width: out_width as u32,
                    height: out_height as u32,
                    pixels,
                    color_type: ColorType::Cmyk,
                })
            }
            _ => {
                let pixels = ycbcr_to_rgb(
                    &comp_data,
                    out_width,
                    out_height,
                    &self.components,
                    self.max_h_sampling,
                    self.max_v_sampling,
                    mcu_width,
                    n,
                );
                Ok(JpegImage {
                    width: out_width as u32,
                    height: out_height as u32,
                    pixels,
                    color_type: ColorType::Rgb,
                })
            }
        }
    }
}

/// Scaled output span of an encoded span: ceil(dim * n / 8).
fn scaled_dim(dim: usize, n: usize) -> usize {
    (dim * n).div_ceil(DCTSIZE)
}

/// Find the end of entropy-coded data (before the next real marker).
fn find_entropy_end(data: &[u8]) -> usize {
    let mut i = 0;
    while i + 1 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        match data[i + 1] {
            0x00 => i += 2,          // byte stuffing: 0xFF00 is data
            0xFF => i += 1,          // fill byte, re-examine
            RST0..=0xD7 => i += 2,   // restart markers belong to the scan
            _ => return i,
        }
    }
    data.len()
}

/// Read a signed amplitude value of the given bit size (JPEG EXTEND).
fn read_amplitude(reader: &mut MsbBitReader, size: u8) -> Result<i32> {
    if size == 0 {
        return Ok(0);
    }
    let bits = reader.read_bits(size)? as i32;
    // A leading 0 bit marks a negative value, stored offset by
    // 2^size - 1.
    if bits >> (size - 1) == 0 {
        Ok(bits - ((1 << size) - 1))
    } else {
        Ok(bits)
    }
}

/// Convert the decoded YCbCr planes to interleaved RGB.
#[allow(clippy::too_many_arguments)]
fn ycbcr_to_rgb(
    comp_data: &[Vec<u8>],
    width: usize,
    height: usize,
    components: &[Component],
    max_h: u8,
    max_v: u8,
    mcu_width: usize,
    n: usize,
) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 3);

    // Chroma planes sit on their own block grid; the sampling ratios are
    // unchanged by scaling, so nearest-neighbor upsampling divides the
    // scaled luma coordinate by the same integer ratio.
    let y_width = mcu_width * max_h as usize * n;
    let cb_width = mcu_width * components[1].h_sampling as usize * n;
    let cr_width = mcu_width * components[2].h_sampling as usize * n;

    let h_ratio_cb = (max_h / components[1].h_sampling) as usize;
    let v_ratio_cb = (max_v / components[1].v_sampling) as usize;
    let h_ratio_cr = (max_h / components[2].h_sampling) as usize;
    let v_ratio_cr = (max_v / components[2].v_sampling) as usize;

    for y in 0..height {
        for x in 0..width {
            let y_idx = y * y_width + x;
            let cb_idx = (y / v_ratio_cb) * cb_width + x / h_ratio_cb;
            let cr_idx = (y / v_ratio_cr) * cr_width + x / h_ratio_cr;

            let y_val = comp_data[0].get(y_idx).copied().unwrap_or(0) as i32;
            let cb_val = comp_data[1].get(cb_idx).copied().unwrap_or(128) as i32 - 128;
            let cr_val = comp_data[2].get(cr_idx).copied().unwrap_or(128) as i32 - 128;

            // ITU-R BT.601 fixed-point conversion.
            let r = y_val + ((cr_val * 359) >> 8);
            let g = y_val - ((cb_val * 88 + cr_val * 183) >> 8);
            let b = y_val + ((cb_val * 454) >> 8);

            pixels.push(r.clamp(0, 255) as u8);
            pixels.push(g.clamp(0, 255) as u8);
            pixels.push(b.clamp(0, 255) as u8);
        }
    }

    pixels
}

/// Interleave the four planes of a CMYK frame without converting them.
#[allow(clippy::too_many_arguments)]
fn interleave_cmyk(
    comp_data: &[Vec<u8>],
    width: usize,
    height: usize,
    components: &[Component],
    max_h: u8,
    max_v: u8,
    mcu_width: usize,
    n: usize,
) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 4);

    // Same per-component upsampling as the YCbCr path; the channel
    // values themselves are emitted as stored.
    let widths: Vec<usize> = components
        .iter()
        .map(|c| mcu_width * c.h_sampling as usize * n)
        .collect();
    let h_ratios: Vec<usize> = components
        .iter()
        .map(|c| (max_h / c.h_sampling) as usize)
        .collect();
    let v_ratios: Vec<usize> = components
        .iter()
        .map(|c| (max_v / c.v_sampling) as usize)
        .collect();

    for y in 0..height {
        for x in 0..width {
            for c in 0..components.len() {
                let idx = (y / v_ratios[c]) * widths[c] + x / h_ratios[c];
                pixels.push(comp_data[c].get(idx).copied().unwrap_or(0));
            }
        }
    }

    pixels
}

/// Decode a JPEG image at full resolution.
pub fn decode(data: &[u8]) -> Result<JpegImage> {
    decode_scaled(data, 8)
}

/// Decode a JPEG image with scaled reconstruction.
///
/// `scaled_size` selects the output block size N in 1..=8: every 8x8
/// coefficient block becomes an NxN pixel block, and the decoded image is
/// `ceil(dim * N / 8)` in each dimension.
pub fn decode_scaled(data: &[u8], scaled_size: u8) -> Result<JpegImage> {
    if !(1..=8).contains(&scaled_size) {
        return Err(Error::InvalidScaledSize(scaled_size));
    }
    JpegDecoder::new(data).decode(scaled_size)
}

/// Read image dimensions and color type without decoding scan data.
pub fn decode_config(data: &[u8]) -> Result<JpegConfig> {
    JpegDecoder::new(data).read_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::idct::ZIGZAG_ORDER;

    #[test]
    fn test_unzigzag_inverts_zigzag_order() {
        for natural in 0..64 {
            assert_eq!(UNZIGZAG[ZIGZAG_ORDER[natural]], natural);
        }
        for zigzag in 0..64 {
            assert_eq!(ZIGZAG_ORDER[UNZIGZAG[zigzag]], zigzag);
        }
    }

    #[test]
    fn test_scaled_dim() {
        assert_eq!(scaled_dim(64, 8), 64);
        assert_eq!(scaled_dim(64, 4), 32);
        assert_eq!(scaled_dim(64, 1), 8);
        assert_eq!(scaled_dim(17, 8), 17);
        assert_eq!(scaled_dim(17, 4), 9);
        assert_eq!(scaled_dim(17, 1), 3);
        assert_eq!(scaled_dim(1, 1), 1);
    }

    #[test]
    fn test_decode_invalid() {
        assert!(decode(b"not a jpeg").is_err());
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_decode_soi_only() {
        assert!(decode(&[0xFF, 0xD8]).is_err());
    }

    #[test]
    fn test_decode_invalid_soi() {
        // EOI before SOI.
        assert!(decode(&[0xFF, 0xD9, 0xFF, 0xD8]).is_err());
    }

    #[test]
    fn test_decode_scaled_rejects_bad_sizes() {
        let data = [0xFF, 0xD8, 0xFF, 0xD9];
        assert_eq!(
            decode_scaled(&data, 0).unwrap_err(),
            Error::InvalidScaledSize(0)
        );
        assert_eq!(
            decode_scaled(&data, 9).unwrap_err(),
            Error::InvalidScaledSize(9)
        );
    }

    #[test]
    fn test_read_amplitude_extend() {
        // JPEG EXTEND: the low half of each size codes negative values.
        fn amp(byte: u8, size: u8) -> i32 {
            let data = [byte];
            read_amplitude(&mut MsbBitReader::new(&data), size).unwrap()
        }

        assert_eq!(amp(0b0000_0000, 1), -1);
        assert_eq!(amp(0b1000_0000, 1), 1);
        assert_eq!(amp(0b0000_0000, 2), -3);
        assert_eq!(amp(0b0100_0000, 2), -2);
        assert_eq!(amp(0b1000_0000, 2), 2);
        assert_eq!(amp(0b1100_0000, 2), 3);
        assert_eq!(amp(0b0000_0000, 7), -127);
        assert_eq!(amp(0b1111_1110, 7), 127);

        // Size 0 reads nothing at all.
        let mut reader = MsbBitReader::new(&[]);
        assert_eq!(read_amplitude(&mut reader, 0).unwrap(), 0);
    }

    #[test]
    fn test_huffman_table_build() {
        let bits = [1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let values = [0, 1];

        let table = HuffmanTable::build(&bits, &values);
        assert_eq!(table.values.len(), 2);
    }

    #[test]
    fn test_huffman_table_code_ranges() {
        let bits = [0, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let values = [0, 1, 2];

        let table = HuffmanTable::build(&bits, &values);
        assert_eq!(table.values.len(), 3);
        assert_eq!(table.max_code[2], 1); // two 2-bit codes: 00, 01
        assert_eq!(table.max_code[3], 4); // one 3-bit code: 100
    }

    #[test]
    fn test_huffman_decode_via_fast_path() {
        // Two 2-bit codes: 00 and 01.
        let bits = [0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let values = [7, 9];
        let table = HuffmanTable::build(&bits, &values);

        let data = [0b0001_0000];
        let mut reader = MsbBitReader::new(&data);
        assert_eq!(table.decode(&mut reader).unwrap(), 7);
        assert_eq!(table.decode(&mut reader).unwrap(), 9);
    }

    #[test]
    fn test_find_entropy_end() {
        // Data ending with an EOI marker.
        let data = [0x12, 0x34, 0xFF, 0xD9];
        assert_eq!(find_entropy_end(&data), 2);

        // Byte stuffing is data, not a marker.
        let data = [0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD9];
        assert_eq!(find_entropy_end(&data), 4);
    }

    #[test]
    fn test_find_entropy_end_restart_markers() {
        let data = [0x12, 0xFF, 0xD0, 0x34, 0xFF, 0xD9];
        assert_eq!(find_entropy_end(&data), 4);
    }

    #[test]
    fn test_find_entropy_end_edge_cases() {
        assert_eq!(find_entropy_end(&[]), 0);
        assert_eq!(find_entropy_end(&[0xFF]), 1);
        assert_eq!(find_entropy_end(&[0x12, 0x34, 0x56]), 3);
        assert_eq!(find_entropy_end(&[0xFF, 0x00, 0xFF, 0x00, 0xFF, 0xD9]), 4);
    }

    fn minimal_header(sampling: u8, quant_id: u8) -> Vec<u8> {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[
            0xFF, 0xC0, // SOF0
            0x00, 0x0B, // length
            0x08, // precision
            0x00, 0x08, // height
            0x00, 0x08, // width
            0x01, // one component
            0x01, // component ID
            sampling, quant_id,
        ]);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn test_decode_zero_sampling_factor() {
        let result = decode(&minimal_header(0x00, 0x00));
        assert!(result.is_err(), "should error on zero sampling factor");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("sampling factors"), "got: {err}");
    }

    #[test]
    fn test_decode_invalid_quant_table_id() {
        let result = decode(&minimal_header(0x11, 0x05));
        assert!(result.is_err(), "should error on invalid quant table ID");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("quantization table ID"), "got: {err}");
    }

    #[test]
    fn test_decode_config_reports_dimensions() {
        let config = decode_config(&minimal_header(0x11, 0x00)).unwrap();
        assert_eq!(
            config,
            JpegConfig {
                width: 8,
                height: 8,
                color_type: ColorType::Gray,
            }
        );
    }

    #[test]
    fn test_decode_config_without_frame_header() {
        assert!(decode_config(&[0xFF, 0xD8, 0xFF, 0xD9]).is_err());
    }

    fn four_component_header() -> Vec<u8> {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[
            0xFF, 0xC0, // SOF0
            0x00, 0x14, // length: 8 + 4 * 3
            0x08, // precision
            0x00, 0x10, // height
            0x00, 0x10, // width
            0x04, // four components (CMYK)
        ]);
        for id in 1..=4u8 {
            jpeg.extend_from_slice(&[id, 0x11, 0x00]);
        }
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn test_decode_config_reports_cmyk() {
        let config = decode_config(&four_component_header()).unwrap();
        assert_eq!(
            config,
            JpegConfig {
                width: 16,
                height: 16,
                color_type: ColorType::Cmyk,
            }
        );
    }

    #[test]
    fn test_decode_rejects_five_components() {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[
            0xFF, 0xC0, 0x00, 0x17, 0x08, 0x00, 0x10, 0x00, 0x10, 0x05,
        ]);
        for id in 1..=5u8 {
            jpeg.extend_from_slice(&[id, 0x11, 0x00]);
        }
        jpeg.extend_from_slice(&[0xFF, 0xD9]);

        let err = decode(&jpeg).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDecode(_)));
    }

    #[test]
    fn test_decode_rejects_progressive() {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[
            0xFF, 0xC2, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00,
        ]);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);

        let err = decode(&jpeg).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDecode(_)));
        assert!(err.to_string().contains("progressive"));
    }

    #[test]
    fn test_decode_rejects_zero_quant_entry() {
        let mut jpeg = vec![0xFF, 0xD8];
        // DQT with a zero in slot 5.
        jpeg.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
        let mut table = [16u8; 64];
        table[5] = 0;
        jpeg.extend_from_slice(&table);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);

        let result = decode(&jpeg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("zero entry"));
    }

    #[test]
    fn test_decode_invalid_dc_table_id() {
        let mut jpeg = Vec::new();
        jpeg.extend_from_slice(&[0xFF, 0xD8]);

        // DQT, table 0.
        jpeg.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
        jpeg.extend_from_slice(&[16u8; 64]);

        // SOF0 with quant table 0.
        jpeg.extend_from_slice(&[
            0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00,
        ]);

        // DHT, DC table 0.
        jpeg.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x14, 0x00]);
        jpeg.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        jpeg.extend_from_slice(&[0]);

        // SOS naming DC table 5 (invalid).
        jpeg.extend_from_slice(&[
            0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x50, 0x00, 0x3F, 0x00,
        ]);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);

        let result = decode(&jpeg);
        assert!(result.is_err(), "should error on invalid DC table ID");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("DC Huffman table ID"), "got: {err}");
    }

    #[test]
    fn test_decode_invalid_ac_table_id() {
        let mut jpeg = Vec::new();
        jpeg.extend_from_slice(&[0xFF, 0xD8]);

        jpeg.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
        jpeg.extend_from_slice(&[16u8; 64]);

        jpeg.extend_from_slice(&[
            0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00,
        ]);

        jpeg.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x14, 0x00]);
        jpeg.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        jpeg.extend_from_slice(&[0]);

        // SOS naming AC table 7 (invalid).
        jpeg.extend_from_slice(&[
            0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x07, 0x00, 0x3F, 0x00,
        ]);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);

        let result = decode(&jpeg);
        assert!(result.is_err(), "should error on invalid AC table ID");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("AC Huffman table ID"), "got: {err}");
    }

    #[test]
    fn test_component_default() {
        let comp = Component::default();
        assert_eq!(comp.id, 0);
        assert_eq!(comp.h_sampling, 0);
        assert_eq!(comp.v_sampling, 0);
        assert_eq!(comp.quant_table_id, 0);
    }

    #[test]
    fn test_huffman_table_default() {
        let table = HuffmanTable::default();
        assert!(table.values.is_empty());
        assert_eq!(table.max_code[1], -1);
    }
}
