// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Camera wire protocol: commands and the records crossing the wire.

use tether::{Decode, Encode, Error, InputBuffer, OutputBuffer, Result};

/// Camera service commands.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Command {
    Create = 0,
    Destroy = 1,
    CallbackSet = 2,
    ParametersGet = 3,
    ParametersSet = 4,
}

impl tether::Command for Command {
    fn to_wire(self) -> i32 {
        self as i32
    }

    fn from_wire(code: i32) -> Option<Self> {
        use Command::*;
        [Create, Destroy, CallbackSet, ParametersGet, ParametersSet]
            .into_iter()
            .find(|cmd| *cmd as i32 == code)
    }
}

/// Capture configuration sent with the create command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConfig {
    pub format: i32,
    pub width: i32,
    pub height: i32,
    pub framerate: i32,
}

impl Encode for CameraConfig {
    fn encode(&self, out: &mut OutputBuffer) {
        self.format.encode(out);
        self.width.encode(out);
        self.height.encode(out);
        self.framerate.encode(out);
    }
}

impl<'a> Decode<'a> for CameraConfig {
    fn decode(input: &mut InputBuffer<'a>) -> Result<Self> {
        Ok(Self {
            format: i32::decode(input)?,
            width: i32::decode(input)?,
            height: i32::decode(input)?,
            framerate: i32::decode(input)?,
        })
    }
}

/// Normalized region of interest; `(0, 0, 1, 1)` is the full frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Roi {
    pub const FULL: Roi = Roi {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn is_full(&self) -> bool {
        *self == Roi::FULL
    }
}

impl Default for Roi {
    fn default() -> Self {
        Roi::FULL
    }
}

impl Encode for Roi {
    fn encode(&self, out: &mut OutputBuffer) {
        self.x.encode(out);
        self.y.encode(out);
        self.width.encode(out);
        self.height.encode(out);
    }
}

impl<'a> Decode<'a> for Roi {
    fn decode(input: &mut InputBuffer<'a>) -> Result<Self> {
        Ok(Self {
            x: f64::decode(input)?,
            y: f64::decode(input)?,
            width: f64::decode(input)?,
            height: f64::decode(input)?,
        })
    }
}

/// Tunable capture parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraParams {
    pub sharpness: f64,
    pub contrast: f64,
    pub brightness: f64,
    pub saturation: f64,
    pub exposure_compensation: f64,
    /// Digital zoom: the backend fits this region back to the full frame
    /// width and height. Forwarded to the backend untouched.
    pub zoom: Roi,
    pub crop: Roi,
}

impl Encode for CameraParams {
    fn encode(&self, out: &mut OutputBuffer) {
        self.sharpness.encode(out);
        self.contrast.encode(out);
        self.brightness.encode(out);
        self.saturation.encode(out);
        self.exposure_compensation.encode(out);
        self.zoom.encode(out);
        self.crop.encode(out);
    }
}

impl<'a> Decode<'a> for CameraParams {
    fn decode(input: &mut InputBuffer<'a>) -> Result<Self> {
        Ok(Self {
            sharpness: f64::decode(input)?,
            contrast: f64::decode(input)?,
            brightness: f64::decode(input)?,
            saturation: f64::decode(input)?,
            exposure_compensation: f64::decode(input)?,
            zoom: Roi::decode(input)?,
            crop: Roi::decode(input)?,
        })
    }
}

/// One captured frame.
///
/// The pixel payload is borrowed: decoding references the received message
/// in place, and the bytes are only valid while that buffer lives. Copy
/// them out if the frame must outlive the callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Image<'a> {
    pub format: i32,
    pub width: i32,
    pub height: i32,
    pub bytes_per_line: i32,
    pub data: &'a [u8],
}

impl Encode for Image<'_> {
    fn encode(&self, out: &mut OutputBuffer) {
        self.format.encode(out);
        self.width.encode(out);
        self.height.encode(out);
        self.bytes_per_line.encode(out);
        (self.data.len() as i32).encode(out);
        out.write(self.data);
    }
}

impl<'a> Decode<'a> for Image<'a> {
    fn decode(input: &mut InputBuffer<'a>) -> Result<Self> {
        let format = i32::decode(input)?;
        let width = i32::decode(input)?;
        let height = i32::decode(input)?;
        let bytes_per_line = i32::decode(input)?;
        let data_size = i32::decode(input)?;
        if data_size < 0 {
            return Err(Error::BadMessage(format!(
                "negative image payload size {data_size}"
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            bytes_per_line,
            data: input.read(data_size as usize)?,
        })
    }
}

/// Encode `image` restricted to `crop`, row by row, without an intermediate
/// frame copy.
///
/// The crop is resolved against the frame geometry; a region that does not
/// intersect the frame fails `invalid_argument`.
pub fn encode_cropped(image: &Image<'_>, crop: &Roi, out: &mut OutputBuffer) -> Result<()> {
    let width = image.width as f64;
    let height = image.height as f64;
    if image.width <= 0 || image.height <= 0 || image.bytes_per_line <= 0 {
        return Err(Error::InvalidArgument("image has no geometry".into()));
    }

    let bytes_per_pixel = (image.bytes_per_line / image.width) as usize;
    let new_width = (width * crop.width).round() as i64;
    let new_height = (height * crop.height).round() as i64;
    let new_x = (width * crop.x).round() as i64;
    let new_y = (height * crop.y).round() as i64;

    if new_width <= 0
        || new_height <= 0
        || new_x < 0
        || new_y < 0
        || new_x + new_width > image.width as i64
        || new_y + new_height > image.height as i64
    {
        return Err(Error::InvalidArgument(format!(
            "crop {crop:?} does not fit a {}x{} frame",
            image.width, image.height
        )));
    }

    let new_bytes_per_line = bytes_per_pixel * new_width as usize;

    image.format.encode(out);
    (new_width as i32).encode(out);
    (new_height as i32).encode(out);
    (new_bytes_per_line as i32).encode(out);
    ((new_bytes_per_line * new_height as usize) as i32).encode(out);

    let stride = image.bytes_per_line as usize;
    for row in new_y..new_y + new_height {
        let start = row as usize * stride + new_x as usize * bytes_per_pixel;
        let end = start + new_bytes_per_line;
        let line = image
            .data
            .get(start..end)
            .ok_or_else(|| Error::OutOfRange("crop exceeds image payload".into()))?;
        out.write(line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether::Command as _;

    #[test]
    fn test_command_wire_values() {
        assert_eq!(Command::Create.to_wire(), 0);
        assert_eq!(Command::ParametersSet.to_wire(), 4);
        assert_eq!(Command::from_wire(2), Some(Command::CallbackSet));
        assert_eq!(Command::from_wire(-1), None);
    }

    #[test]
    fn test_params_roundtrip() {
        let params = CameraParams {
            sharpness: 0.1,
            contrast: 0.2,
            brightness: 0.3,
            saturation: 0.4,
            exposure_compensation: -1.0,
            zoom: Roi {
                x: 0.1,
                y: 0.1,
                width: 0.8,
                height: 0.8,
            },
            crop: Roi {
                x: 0.25,
                y: 0.25,
                width: 0.5,
                height: 0.5,
            },
        };

        let mut out = OutputBuffer::new();
        params.encode(&mut out);
        // five scalars plus two four-field regions
        assert_eq!(out.len(), 104);

        let bytes = out.into_bytes();
        let mut input = InputBuffer::new(&bytes);
        assert_eq!(CameraParams::decode(&mut input).unwrap(), params);
    }

    #[test]
    fn test_image_decode_borrows_payload() {
        let pixels: Vec<u8> = (0..12).collect();
        let image = Image {
            format: 1,
            width: 2,
            height: 2,
            bytes_per_line: 6,
            data: &pixels,
        };

        let mut out = OutputBuffer::new();
        image.encode(&mut out);
        let bytes = out.into_bytes();

        let mut input = InputBuffer::new(&bytes);
        let decoded = Image::decode(&mut input).unwrap();
        assert_eq!(decoded, image);
        // Zero-copy: the payload points into the serialized message.
        assert_eq!(decoded.data.as_ptr(), bytes[24..].as_ptr());
    }

    #[test]
    fn test_cropped_encoding_extracts_the_region() {
        // 4x4 frame, 1 byte per pixel, rows 0..4 hold values row*4+col.
        let pixels: Vec<u8> = (0..16).collect();
        let image = Image {
            format: 0,
            width: 4,
            height: 4,
            bytes_per_line: 4,
            data: &pixels,
        };
        let crop = Roi {
            x: 0.5,
            y: 0.5,
            width: 0.5,
            height: 0.5,
        };

        let mut out = OutputBuffer::new();
        encode_cropped(&image, &crop, &mut out).unwrap();

        let bytes = out.into_bytes();
        let mut input = InputBuffer::new(&bytes);
        let cropped = Image::decode(&mut input).unwrap();
        assert_eq!(cropped.width, 2);
        assert_eq!(cropped.height, 2);
        assert_eq!(cropped.bytes_per_line, 2);
        // Bottom-right quadrant of the frame.
        assert_eq!(cropped.data, &[10, 11, 14, 15]);
    }

    #[test]
    fn test_crop_outside_frame_is_rejected() {
        let pixels = [0u8; 16];
        let image = Image {
            format: 0,
            width: 4,
            height: 4,
            bytes_per_line: 4,
            data: &pixels,
        };
        let crop = Roi {
            x: 0.75,
            y: 0.0,
            width: 0.5,
            height: 1.0,
        };

        let mut out = OutputBuffer::new();
        let err = encode_cropped(&image, &crop, &mut out).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_full_roi_detection() {
        assert!(Roi::FULL.is_full());
        assert!(Roi::default().is_full());
        assert!(!Roi {
            x: 0.0,
            y: 0.0,
            width: 0.5,
            height: 1.0
        }
        .is_full());
    }
}
