use crate::loader::ImageSource;
use crate::session::{Session, KEYWORD_PANEL_HEIGHT};
use crate::transform::PixelBuffer;
use crate::view::DisplayMode;

// Softbuffer frames are u32 per pixel, 0x00RRGGBB.

pub const BG_COLOR: u32 = rgb(31, 31, 31);
const PANEL_COLOR: (u8, u8, u8, u8) = (48, 48, 48, 255);
const FLAG_ON: (u8, u8, u8, u8) = (230, 180, 40, 255);
const FLAG_OFF: (u8, u8, u8, u8) = (90, 90, 90, 255);
const NOTICE_COLOR: (u8, u8, u8, u8) = (200, 40, 40, 200);
const NOTICE_HEIGHT: u32 = 6;
/// Flags shown in the keyword strip; these are the ones with keys.
const STRIP_FLAGS: u32 = 10;

pub const fn rgb(r: u8, g: u8, b: u8) -> u32 {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

fn unpack_rgb(v: u32) -> (u8, u8, u8) {
    ((v >> 16) as u8, (v >> 8) as u8, v as u8)
}

fn blend(dst: u32, r: u8, g: u8, b: u8, a: u8) -> u32 {
    match a {
        255 => rgb(r, g, b),
        0 => dst,
        _ => {
            let a = a as u32;
            let inv = 255 - a;
            let (dr, dg, db) = unpack_rgb(dst);
            rgb(
                ((r as u32 * a + dr as u32 * inv) / 255) as u8,
                ((g as u32 * a + dg as u32 * inv) / 255) as u8,
                ((b as u32 * a + db as u32 * inv) / 255) as u8,
            )
        }
    }
}

/// Fill a rectangle, alpha blended, clipped to the frame.
pub fn fill_rect(
    buf: &mut [u32],
    stride: u32,
    buf_h: u32,
    rx: i32,
    ry: i32,
    rw: u32,
    rh: u32,
    color: (u8, u8, u8, u8),
) {
    let x0 = rx.clamp(0, stride as i32) as u32;
    let y0 = ry.clamp(0, buf_h as i32) as u32;
    let x1 = (rx + rw as i32).clamp(0, stride as i32) as u32;
    let y1 = (ry + rh as i32).clamp(0, buf_h as i32) as u32;
    for y in y0..y1 {
        let row = (y * stride) as usize;
        for px in &mut buf[row + x0 as usize..row + x1.max(x0) as usize] {
            *px = blend(*px, color.0, color.1, color.2, color.3);
        }
    }
}

/// Copy `img` into the frame with its top-left corner at `(x0, y0)`.
/// Gray and alpha channels are handled; anything off-frame is clipped.
pub fn blit(dst: &mut [u32], dst_w: u32, dst_h: u32, img: &PixelBuffer, x0: i32, y0: i32) {
    let (w, h) = img.size();
    let sx0 = (-x0).max(0) as u32;
    let sy0 = (-y0).max(0) as u32;
    let sx1 = w.min((dst_w as i64 - x0 as i64).clamp(0, u32::MAX as i64) as u32);
    let sy1 = h.min((dst_h as i64 - y0 as i64).clamp(0, u32::MAX as i64) as u32);

    for sy in sy0..sy1 {
        let dy = (sy as i32 + y0) as usize;
        for sx in sx0..sx1 {
            let di = dy * dst_w as usize + (sx as i32 + x0) as usize;
            let p = img.pixel(sx, sy);
            dst[di] = match *p {
                [v] => rgb(v, v, v),
                [v, a] => blend(dst[di], v, v, v, a),
                [r, g, b] => rgb(r, g, b),
                [r, g, b, a] => blend(dst[di], r, g, b, a),
                _ => dst[di],
            };
        }
    }
}

/// One cell per keyed flag, lit when set.
pub fn draw_flag_strip(dst: &mut [u32], dst_w: u32, dst_h: u32, y0: i32, flags: u32) {
    let cell = (dst_w / STRIP_FLAGS).max(1);
    let pad = (cell / 8).max(1);
    for n in 0..STRIP_FLAGS {
        let color = if flags & (1 << n) != 0 { FLAG_ON } else { FLAG_OFF };
        fill_rect(
            dst,
            dst_w,
            dst_h,
            (n * cell + pad) as i32,
            y0 + pad as i32,
            cell.saturating_sub(2 * pad),
            KEYWORD_PANEL_HEIGHT.saturating_sub(2 * pad),
            color,
        );
    }
}

/// Draw the whole frame for the session's current state.
pub fn compose<S: ImageSource>(frame: &mut [u32], fb_w: u32, fb_h: u32, session: &Session<S>) {
    frame.fill(BG_COLOR);

    let Some(rec) = session.current_record() else {
        return;
    };
    if let Some(pixels) = &rec.pixels {
        let (x, y) = session.draw_offset();
        blit(frame, fb_w, fb_h, pixels, x, y);
    }

    if session.modes().display == DisplayMode::Keywords {
        let top = rec.cur_height as i32;
        fill_rect(frame, fb_w, fb_h, 0, top, fb_w, KEYWORD_PANEL_HEIGHT, PANEL_COLOR);
        draw_flag_strip(frame, fb_w, fb_h, top, rec.note_flags);
    }

    if session.notice().is_some() {
        fill_rect(frame, fb_w, fb_h, 0, 0, fb_w, NOTICE_HEIGHT, NOTICE_COLOR);
    }
}
