// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Texel encoding and decoding for the formats the device stores.
//!
//! Float reads of formats with fewer than four channels fill the missing
//! channels with `(0, 0, 0, 1)`, like a shader load does.

use bytemuck::pod_read_unaligned;
use cortex_core::renderer::api::Format;
use half::f16;

fn f32_at(bytes: &[u8], i: usize) -> f32 {
    pod_read_unaligned(&bytes[i * 4..i * 4 + 4])
}

fn u32_at(bytes: &[u8], i: usize) -> u32 {
    pod_read_unaligned(&bytes[i * 4..i * 4 + 4])
}

fn f16_at(bytes: &[u8], i: usize) -> f32 {
    f16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]).to_f32()
}

fn unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// Reads one texel as floats.
pub(crate) fn decode(format: Format, bytes: &[u8]) -> [f32; 4] {
    match format {
        Format::Rgba8Unorm | Format::Rgba8Typeless => [
            f32::from(bytes[0]) / 255.0,
            f32::from(bytes[1]) / 255.0,
            f32::from(bytes[2]) / 255.0,
            f32::from(bytes[3]) / 255.0,
        ],
        Format::Rgba16Float => [
            f16_at(bytes, 0),
            f16_at(bytes, 1),
            f16_at(bytes, 2),
            f16_at(bytes, 3),
        ],
        Format::Rg16Float => [f16_at(bytes, 0), f16_at(bytes, 1), 0.0, 1.0],
        Format::Rgba32Float => [
            f32_at(bytes, 0),
            f32_at(bytes, 1),
            f32_at(bytes, 2),
            f32_at(bytes, 3),
        ],
        Format::R32Float | Format::R32Typeless | Format::D32Float => {
            [f32_at(bytes, 0), 0.0, 0.0, 1.0]
        }
        Format::Rg32Uint => [u32_at(bytes, 0) as f32, u32_at(bytes, 1) as f32, 0.0, 1.0],
        Format::R32Uint => [u32_at(bytes, 0) as f32, 0.0, 0.0, 1.0],
        Format::Unknown => [0.0; 4],
    }
}

/// Writes one texel from floats. Extra channels are dropped.
pub(crate) fn encode(format: Format, value: [f32; 4], out: &mut [u8]) {
    match format {
        Format::Rgba8Unorm | Format::Rgba8Typeless => {
            for (dst, v) in out[..4].iter_mut().zip(value) {
                *dst = unorm8(v);
            }
        }
        Format::Rgba16Float => {
            for (i, v) in value.iter().enumerate() {
                out[i * 2..i * 2 + 2].copy_from_slice(&f16::from_f32(*v).to_le_bytes());
            }
        }
        Format::Rg16Float => {
            for (i, v) in value[..2].iter().enumerate() {
                out[i * 2..i * 2 + 2].copy_from_slice(&f16::from_f32(*v).to_le_bytes());
            }
        }
        Format::Rgba32Float => out[..16].copy_from_slice(bytemuck::cast_slice(&value)),
        Format::R32Float | Format::R32Typeless | Format::D32Float => {
            out[..4].copy_from_slice(&value[0].to_le_bytes());
        }
        Format::Rg32Uint => {
            out[..4].copy_from_slice(&(value[0] as u32).to_le_bytes());
            out[4..8].copy_from_slice(&(value[1] as u32).to_le_bytes());
        }
        Format::R32Uint => out[..4].copy_from_slice(&(value[0] as u32).to_le_bytes()),
        Format::Unknown => {}
    }
}

/// Reads one texel of an integer format.
pub(crate) fn decode_uint(format: Format, bytes: &[u8]) -> [u32; 4] {
    match format {
        Format::Rg32Uint => [u32_at(bytes, 0), u32_at(bytes, 1), 0, 1],
        Format::R32Uint | Format::R32Typeless => [u32_at(bytes, 0), 0, 0, 1],
        other => decode(other, bytes).map(|v| v as u32),
    }
}

/// Writes one texel of an integer format.
pub(crate) fn encode_uint(format: Format, value: [u32; 4], out: &mut [u8]) {
    match format {
        Format::Rg32Uint => {
            out[..4].copy_from_slice(&value[0].to_le_bytes());
            out[4..8].copy_from_slice(&value[1].to_le_bytes());
        }
        Format::R32Uint | Format::R32Typeless => out[..4].copy_from_slice(&value[0].to_le_bytes()),
        other => encode(other, value.map(|v| v as f32), out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_half_float_round_trip_is_close() {
        let mut texel = [0u8; 8];
        encode(Format::Rgba16Float, [0.25, -1.5, 100.0, 1.0], &mut texel);
        let back = decode(Format::Rgba16Float, &texel);
        assert_relative_eq!(back[0], 0.25);
        assert_relative_eq!(back[1], -1.5);
        assert_relative_eq!(back[2], 100.0);
    }

    #[test]
    fn test_unorm_clamps_and_rounds() {
        let mut texel = [0u8; 4];
        encode(Format::Rgba8Unorm, [2.0, -1.0, 0.5, 1.0], &mut texel);
        assert_eq!(texel, [255, 0, 128, 255]);
    }

    #[test]
    fn test_missing_channels_read_as_zero_zero_one() {
        let mut texel = [0u8; 4];
        encode(Format::D32Float, [0.75, 9.0, 9.0, 9.0], &mut texel);
        assert_eq!(decode(Format::D32Float, &texel), [0.75, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_uint_formats_keep_all_bits() {
        let mut texel = [0u8; 8];
        encode_uint(Format::Rg32Uint, [0xFFFF_FFFF, 0x0123_4567, 0, 0], &mut texel);
        assert_eq!(
            decode_uint(Format::Rg32Uint, &texel),
            [0xFFFF_FFFF, 0x0123_4567, 0, 1]
        );
    }
}
