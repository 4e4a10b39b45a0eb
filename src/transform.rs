use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("can't make a {width}x{height} image")]
    Degenerate { width: u32, height: u32 },

    #[error("not enough memory for a {width}x{height} image")]
    OutOfMemory { width: u32, height: u32 },

    #[error("illegal rotation value {0}")]
    BadAngle(i32),

    #[error("unsupported channel count {0}")]
    Channels(u8),

    #[error("pixel data is {got} bytes, layout needs {want}")]
    BadLayout { got: usize, want: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
}

// ---------------------------------------------------------------------------
// Pixel buffer
// ---------------------------------------------------------------------------

/// An owned 8-bit-per-channel image with an explicit row stride.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    rowstride: usize,
    pixels: Vec<u8>,
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("rowstride", &self.rowstride)
            .finish()
    }
}

fn alloc_zeroed(len: usize, width: u32, height: u32) -> Result<Vec<u8>, TransformError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| TransformError::OutOfMemory { width, height })?;
    v.resize(len, 0);
    Ok(v)
}

fn check_shape(width: u32, height: u32, channels: u8) -> Result<usize, TransformError> {
    if !(1..=4).contains(&channels) {
        return Err(TransformError::Channels(channels));
    }
    if width == 0 || height == 0 {
        return Err(TransformError::Degenerate { width, height });
    }
    (width as usize)
        .checked_mul(channels as usize)
        .ok_or(TransformError::OutOfMemory { width, height })
}

impl PixelBuffer {
    /// A zero-filled, tightly packed buffer.
    pub fn new(width: u32, height: u32, channels: u8) -> Result<Self, TransformError> {
        let rowstride = check_shape(width, height, channels)?;
        let len = rowstride
            .checked_mul(height as usize)
            .ok_or(TransformError::OutOfMemory { width, height })?;
        Ok(Self {
            width,
            height,
            channels,
            rowstride,
            pixels: alloc_zeroed(len, width, height)?,
        })
    }

    /// Wrap decoded bytes. The last row may be shorter than `rowstride`.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        rowstride: usize,
        pixels: Vec<u8>,
    ) -> Result<Self, TransformError> {
        let row_bytes = check_shape(width, height, channels)?;
        let want = rowstride
            .checked_mul(height as usize - 1)
            .and_then(|n| n.checked_add(row_bytes))
            .ok_or(TransformError::OutOfMemory { width, height })?;
        if rowstride < row_bytes || pixels.len() < want {
            return Err(TransformError::BadLayout {
                got: pixels.len(),
                want,
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            rowstride,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn rowstride(&self) -> usize {
        self.rowstride
    }

    pub fn has_alpha(&self) -> bool {
        self.channels == 4
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let off = y as usize * self.rowstride + x as usize * self.channels as usize;
        &self.pixels[off..off + self.channels as usize]
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let off = y as usize * self.rowstride + x as usize * self.channels as usize;
        &mut self.pixels[off..off + self.channels as usize]
    }

    // -----------------------------------------------------------------------
    // Rotation
    // -----------------------------------------------------------------------

    /// Rotate in place by a multiple of 90 degrees (clockwise, negative
    /// values allowed). Zero returns without touching the buffer; on error
    /// the buffer is unchanged.
    pub fn rotate(&mut self, degrees: i32) -> Result<(), TransformError> {
        let degrees = normalize_degrees(degrees)?;
        if degrees == 0 {
            return Ok(());
        }
        *self = self.rotated_by(degrees)?;
        Ok(())
    }

    /// A rotated copy; `degrees` must already be one of 0/90/180/270.
    pub fn rotated_by(&self, degrees: u32) -> Result<PixelBuffer, TransformError> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut out = match degrees {
            0 => return Ok(self.clone()),
            180 => PixelBuffer::new(self.width, self.height, self.channels)?,
            90 | 270 => PixelBuffer::new(self.height, self.width, self.channels)?,
            _ => return Err(TransformError::BadAngle(degrees as i32)),
        };

        let ch = self.channels as usize;
        for y in 0..h {
            let row = &self.pixels[y * self.rowstride..];
            for x in 0..w {
                let (nx, ny) = match degrees {
                    90 => (h - y - 1, x),
                    180 => (w - x - 1, h - y - 1),
                    _ => (y, w - x - 1),
                };
                let dst = ny * out.rowstride + nx * ch;
                out.pixels[dst..dst + ch].copy_from_slice(&row[x * ch..x * ch + ch]);
            }
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Rescaling
    // -----------------------------------------------------------------------

    pub fn rescale(
        &self,
        width: u32,
        height: u32,
        interp: Interpolation,
    ) -> Result<PixelBuffer, TransformError> {
        let mut out = PixelBuffer::new(width, height, self.channels)?;
        match interp {
            Interpolation::Nearest => self.sample_nearest(&mut out),
            Interpolation::Bilinear => self.sample_bilinear(&mut out),
        }
        Ok(out)
    }

    fn sample_nearest(&self, out: &mut PixelBuffer) {
        let ch = self.channels as usize;
        let src_x: Vec<usize> = (0..out.width as u64)
            .map(|x| (x * self.width as u64 / out.width as u64) as usize * ch)
            .collect();

        for y in 0..out.height as usize {
            let sy = (y as u64 * self.height as u64 / out.height as u64) as usize;
            let src_row = &self.pixels[sy * self.rowstride..];
            let dst_row = y * out.rowstride;
            for (x, &sx) in src_x.iter().enumerate() {
                let d = dst_row + x * ch;
                out.pixels[d..d + ch].copy_from_slice(&src_row[sx..sx + ch]);
            }
        }
    }

    fn sample_bilinear(&self, out: &mut PixelBuffer) {
        let ch = self.channels as usize;
        // Pixel-centre alignment: same-size output reproduces the input.
        let axis = |dst: u32, src: u32| -> Vec<(usize, usize, f32)> {
            let scale = src as f32 / dst as f32;
            (0..dst)
                .map(|i| {
                    let pos = ((i as f32 + 0.5) * scale - 0.5).clamp(0.0, (src - 1) as f32);
                    let lo = pos.floor() as usize;
                    let hi = (lo + 1).min(src as usize - 1);
                    (lo, hi, pos - lo as f32)
                })
                .collect()
        };
        let xs = axis(out.width, self.width);
        let ys = axis(out.height, self.height);

        for (y, &(y0, y1, fy)) in ys.iter().enumerate() {
            let top = &self.pixels[y0 * self.rowstride..];
            let bottom = &self.pixels[y1 * self.rowstride..];
            for (x, &(x0, x1, fx)) in xs.iter().enumerate() {
                let d = y * out.rowstride + x * ch;
                for c in 0..ch {
                    let t = top[x0 * ch + c] as f32 * (1.0 - fx) + top[x1 * ch + c] as f32 * fx;
                    let b = bottom[x0 * ch + c] as f32 * (1.0 - fx)
                        + bottom[x1 * ch + c] as f32 * fx;
                    out.pixels[d + c] = (t * (1.0 - fy) + b * fy).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry helpers
// ---------------------------------------------------------------------------

/// Map any multiple of 90 (negative allowed) onto 0, 90, 180 or 270.
pub fn normalize_degrees(degrees: i32) -> Result<u32, TransformError> {
    let d = degrees.rem_euclid(360);
    if d % 90 != 0 {
        return Err(TransformError::BadAngle(degrees));
    }
    Ok(d as u32)
}

/// Swap `(w, h)` when turning by `degrees` changes orientation.
pub fn turned(size: (u32, u32), degrees: u32) -> (u32, u32) {
    if degrees % 180 == 90 {
        (size.1, size.0)
    } else {
        size
    }
}

/// Largest size no bigger than the box that keeps the aspect ratio.
/// Sizes that already fit come back unchanged; nothing is ever enlarged.
pub fn fit_to_box(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    if max_width == 0 || max_height == 0 {
        return (width.min(max_width), height.min(max_height));
    }
    let xratio = width as f64 / max_width as f64;
    let yratio = height as f64 / max_height as f64;
    let ratio = xratio.max(yratio);
    let w = (width as f64 / ratio).round() as u32;
    let h = (height as f64 / ratio).round() as u32;
    (w.clamp(1, max_width), h.clamp(1, max_height))
}

/// Bring `src` (which already carries `src_rot` degrees of rotation) to
/// `want_rot` degrees at `target` size, `target` given in the final
/// orientation. Net upscales rotate first, net downscales scale first, so
/// the rotation always runs over the smaller pixel count.
///
/// Returns `Ok(None)` when `src` is already right.
pub fn scale_and_rotate(
    src: &PixelBuffer,
    src_rot: u32,
    want_rot: u32,
    target: (u32, u32),
    interp: Interpolation,
) -> Result<Option<PixelBuffer>, TransformError> {
    let delta = normalize_degrees(want_rot as i32 - src_rot as i32)?;
    let (tw, th) = target;
    let (pre_w, pre_h) = turned(target, delta);
    let resize = (pre_w, pre_h) != src.size();

    let out = match (delta, resize) {
        (0, false) => return Ok(None),
        (0, true) => src.rescale(tw, th, interp)?,
        (_, false) => src.rotated_by(delta)?,
        (_, true) => {
            let src_pixels = src.width as u64 * src.height as u64;
            if tw as u64 * th as u64 > src_pixels {
                src.rotated_by(delta)?.rescale(tw, th, interp)?
            } else {
                src.rescale(pre_w, pre_h, interp)?.rotated_by(delta)?
            }
        }
    };
    Ok(Some(out))
}

#[cfg(test)]
pub(crate) fn test_pattern(width: u32, height: u32, channels: u8) -> PixelBuffer {
    let mut buf = PixelBuffer::new(width, height, channels).unwrap();
    for y in 0..height {
        for x in 0..width {
            for (c, v) in buf.pixel_mut(x, y).iter_mut().enumerate() {
                *v = ((x * 31 + y * 17 + c as u32 * 7) % 251) as u8;
            }
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_quarter_turns_round_trip() {
        for &(w, h) in &[(1, 1), (1, 5), (4, 3), (7, 2), (16, 9)] {
            for ch in 1..=4 {
                let orig = test_pattern(w, h, ch);
                let mut buf = orig.clone();
                for _ in 0..4 {
                    buf.rotate(90).unwrap();
                }
                assert_eq!(buf, orig, "{w}x{h}x{ch}");
            }
        }
    }

    #[test]
    fn half_turn_twice_round_trips() {
        let orig = test_pattern(5, 3, 3);
        let mut buf = orig.clone();
        buf.rotate(180).unwrap();
        assert_ne!(buf, orig);
        buf.rotate(180).unwrap();
        assert_eq!(buf, orig);
    }

    #[test]
    fn quarter_turn_moves_pixels_clockwise() {
        let src = test_pattern(3, 2, 3);
        let cw = src.rotated_by(90).unwrap();
        assert_eq!(cw.size(), (2, 3));
        // Top-left goes to top-right, bottom-left to top-left.
        assert_eq!(cw.pixel(1, 0), src.pixel(0, 0));
        assert_eq!(cw.pixel(0, 0), src.pixel(0, 1));

        let ccw = src.rotated_by(270).unwrap();
        assert_eq!(ccw.pixel(0, 2), src.pixel(0, 0));
        assert_eq!(ccw.pixel(0, 0), src.pixel(2, 0));
    }

    #[test]
    fn negative_angles_normalize() {
        assert_eq!(normalize_degrees(-90), Ok(270));
        assert_eq!(normalize_degrees(450), Ok(90));
        assert_eq!(normalize_degrees(45), Err(TransformError::BadAngle(45)));

        let src = test_pattern(4, 3, 4);
        let mut a = src.clone();
        a.rotate(-90).unwrap();
        assert_eq!(a, src.rotated_by(270).unwrap());
    }

    #[test]
    fn zero_rotation_keeps_the_allocation() {
        let mut buf = test_pattern(6, 4, 3);
        let before = buf.as_bytes().as_ptr();
        buf.rotate(0).unwrap();
        buf.rotate(360).unwrap();
        assert_eq!(buf.as_bytes().as_ptr(), before);
    }

    #[test]
    fn strided_source_rotates() {
        // Rows padded to 8 bytes for a 2-pixel RGB image.
        let raw = vec![1, 1, 1, 2, 2, 2, 0, 0, 3, 3, 3, 4, 4, 4];
        let buf = PixelBuffer::from_raw(2, 2, 3, 8, raw).unwrap();
        let r = buf.rotated_by(180).unwrap();
        assert_eq!(r.pixel(0, 0), &[4, 4, 4]);
        assert_eq!(r.pixel(1, 1), &[1, 1, 1]);
        assert_eq!(r.rowstride(), 6);
    }

    #[test]
    fn from_raw_rejects_short_data() {
        let err = PixelBuffer::from_raw(4, 4, 3, 12, vec![0; 20]).unwrap_err();
        assert_eq!(err, TransformError::BadLayout { got: 20, want: 48 });
    }

    #[test]
    fn rescale_same_size_is_identity() {
        let src = test_pattern(9, 5, 3);
        assert_eq!(src.rescale(9, 5, Interpolation::Nearest).unwrap(), src);
        assert_eq!(src.rescale(9, 5, Interpolation::Bilinear).unwrap(), src);
    }

    #[test]
    fn rescale_degenerate_is_an_error() {
        let src = test_pattern(4, 4, 3);
        assert_eq!(
            src.rescale(0, 10, Interpolation::Nearest),
            Err(TransformError::Degenerate { width: 0, height: 10 })
        );
    }

    #[test]
    fn nearest_downscale_picks_source_pixels() {
        let src = test_pattern(8, 8, 3);
        let half = src.rescale(4, 4, Interpolation::Nearest).unwrap();
        assert_eq!(half.pixel(1, 2), src.pixel(2, 4));
    }

    #[test]
    fn bilinear_blends_neighbours() {
        let raw = vec![0, 100];
        let src = PixelBuffer::from_raw(2, 1, 1, 2, raw).unwrap();
        let wide = src.rescale(4, 1, Interpolation::Bilinear).unwrap();
        assert_eq!(wide.as_bytes(), &[0, 25, 75, 100]);

        let flat = PixelBuffer::from_raw(1, 1, 3, 3, vec![9, 8, 7]).unwrap();
        let big = flat.rescale(3, 3, Interpolation::Bilinear).unwrap();
        assert!(big.as_bytes().chunks(3).all(|p| p == [9, 8, 7]));
    }

    #[test]
    fn fit_to_box_stays_inside() {
        for w in [1u32, 5, 199, 200, 201, 640, 1999, 4000] {
            for h in [1u32, 3, 150, 480, 3001] {
                for (mw, mh) in [(200u32, 200u32), (1024, 768), (1, 1), (300, 50)] {
                    let (nw, nh) = fit_to_box(w, h, mw, mh);
                    assert!(nw <= mw && nh <= mh, "{w}x{h} in {mw}x{mh} gave {nw}x{nh}");
                    if w <= mw && h <= mh {
                        assert_eq!((nw, nh), (w, h));
                    }
                }
            }
        }
    }

    #[test]
    fn fit_to_box_keeps_aspect() {
        assert_eq!(fit_to_box(800, 600, 200, 200), (200, 150));
        assert_eq!(fit_to_box(400, 800, 200, 200), (100, 200));
        assert_eq!(fit_to_box(3000, 2000, 1600, 1200), (1600, 1067));
    }

    #[test]
    fn scale_and_rotate_nothing_to_do() {
        let src = test_pattern(4, 2, 3);
        let out = scale_and_rotate(&src, 90, 90, (4, 2), Interpolation::Nearest).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn scale_and_rotate_orders_by_direction() {
        let src = test_pattern(40, 20, 3);

        let down = scale_and_rotate(&src, 0, 90, (10, 20), Interpolation::Nearest)
            .unwrap()
            .unwrap();
        assert_eq!(down.size(), (10, 20));

        let up = scale_and_rotate(&src, 0, 270, (40, 80), Interpolation::Nearest)
            .unwrap()
            .unwrap();
        assert_eq!(up.size(), (40, 80));

        let back = scale_and_rotate(&up, 270, 0, (40, 20), Interpolation::Nearest)
            .unwrap()
            .unwrap();
        assert_eq!(back, src);
    }
}
