use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::transform::PixelBuffer;

// ---------------------------------------------------------------------------
// Image record
// ---------------------------------------------------------------------------

/// One file of the working set plus everything the user has said about it.
#[derive(Debug)]
pub struct ImageRecord {
    pub path: PathBuf,

    /// Decoded size, swapped when `cur_rot` is 90 or 270.
    pub true_width: u32,
    pub true_height: u32,
    /// Size of the buffer in `pixels`.
    pub cur_width: u32,
    pub cur_height: u32,

    /// Rotation baked into `pixels`; while nothing is loaded, the rotation
    /// the next load will bake in.
    pub cur_rot: u32,
    /// Rotation from the file's metadata; `None` until first loaded.
    pub exif_rot: Option<u32>,
    pub date: Option<NaiveDateTime>,

    pub note_flags: u32,
    pub comment: Option<String>,
    pub caption: Option<String>,
    /// A per-image caption file was read for this record.
    pub caption_on_disk: bool,
    pub deleted: bool,

    pub pixels: Option<PixelBuffer>,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            true_width: 0,
            true_height: 0,
            cur_width: 0,
            cur_height: 0,
            cur_rot: 0,
            exif_rot: None,
            date: None,
            note_flags: 0,
            comment: None,
            caption: None,
            caption_on_disk: false,
            deleted: false,
            pixels: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn true_size(&self) -> (u32, u32) {
        (self.true_width, self.true_height)
    }

    pub fn cur_size(&self) -> (u32, u32) {
        (self.cur_width, self.cur_height)
    }

    pub fn is_loaded(&self) -> bool {
        self.pixels.is_some()
    }

    /// Install a freshly transformed buffer that carries `rot` degrees.
    /// `native` is the unscaled size at that rotation.
    pub fn set_pixels(&mut self, pixels: PixelBuffer, rot: u32, native: (u32, u32)) {
        (self.true_width, self.true_height) = native;
        (self.cur_width, self.cur_height) = pixels.size();
        self.cur_rot = rot;
        self.pixels = Some(pixels);
    }

    /// Drop the pixels but remember sizes and rotation.
    pub fn unload(&mut self) {
        self.pixels = None;
    }
}

// ---------------------------------------------------------------------------
// Circular list, stored as an arena
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(usize);

#[derive(Debug)]
struct Node {
    record: ImageRecord,
    prev: ImageId,
    next: ImageId,
}

/// Circular doubly-linked list of images. Links are arena indices; slots
/// are never reused, so a stale `ImageId` can only ever miss.
#[derive(Debug, Default)]
pub struct ImageList {
    slots: Vec<Option<Node>>,
    head: Option<ImageId>,
    current: Option<ImageId>,
    len: usize,
}

impl ImageList {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, id: ImageId) -> &Node {
        self.slots[id.0].as_ref().expect("image list link to a removed node")
    }

    fn node_mut(&mut self, id: ImageId) -> &mut Node {
        self.slots[id.0].as_mut().expect("image list link to a removed node")
    }

    pub fn append(&mut self, record: ImageRecord) -> ImageId {
        let id = ImageId(self.slots.len());
        let (prev, next) = match self.head {
            None => {
                self.head = Some(id);
                (id, id)
            }
            Some(head) => {
                let tail = self.node(head).prev;
                self.node_mut(tail).next = id;
                self.node_mut(head).prev = id;
                (tail, head)
            }
        };
        self.slots.push(Some(Node { record, prev, next }));
        self.len += 1;
        id
    }

    /// Unlink `id` and hand its record back. If it was current, current
    /// becomes `None`; the caller picks the replacement.
    pub fn remove(&mut self, id: ImageId) -> Option<ImageRecord> {
        let node = self.slots.get_mut(id.0)?.take()?;
        self.len -= 1;

        if node.next == id {
            self.head = None;
        } else {
            self.node_mut(node.prev).next = node.next;
            self.node_mut(node.next).prev = node.prev;
            if self.head == Some(id) {
                self.head = Some(node.next);
            }
        }
        if self.current == Some(id) {
            self.current = None;
        }
        Some(node.record)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = None;
        self.current = None;
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: ImageId) -> bool {
        matches!(self.slots.get(id.0), Some(Some(_)))
    }

    pub fn get(&self, id: ImageId) -> Option<&ImageRecord> {
        self.slots.get(id.0)?.as_ref().map(|n| &n.record)
    }

    pub fn get_mut(&mut self, id: ImageId) -> Option<&mut ImageRecord> {
        self.slots.get_mut(id.0)?.as_mut().map(|n| &mut n.record)
    }

    pub fn next(&self, id: ImageId) -> Option<ImageId> {
        self.slots.get(id.0)?.as_ref().map(|n| n.next)
    }

    pub fn prev(&self, id: ImageId) -> Option<ImageId> {
        self.slots.get(id.0)?.as_ref().map(|n| n.prev)
    }

    pub fn head(&self) -> Option<ImageId> {
        self.head
    }

    pub fn tail(&self) -> Option<ImageId> {
        self.head.and_then(|h| self.prev(h))
    }

    pub fn current(&self) -> Option<ImageId> {
        self.current
    }

    /// Returns false (and leaves current alone) if `id` isn't in the list.
    pub fn set_current(&mut self, id: Option<ImageId>) -> bool {
        match id {
            Some(id) if !self.contains(id) => false,
            _ => {
                self.current = id;
                true
            }
        }
    }

    pub fn current_record(&self) -> Option<&ImageRecord> {
        self.current.and_then(|id| self.get(id))
    }

    pub fn current_record_mut(&mut self) -> Option<&mut ImageRecord> {
        self.current.and_then(|id| self.get_mut(id))
    }

    /// Position of `id` counting from the head, 1-based.
    pub fn position(&self, id: ImageId) -> Option<usize> {
        self.iter().position(|(i, _)| i == id).map(|p| p + 1)
    }

    /// Handles in list order, for walks that mutate as they go.
    pub fn ids(&self) -> Vec<ImageId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// One lap starting at the head.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            next: self.head,
            remaining: self.len,
        }
    }
}

pub struct Iter<'a> {
    list: &'a ImageList,
    next: Option<ImageId>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (ImageId, &'a ImageRecord);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.next?;
        let node = self.list.node(id);
        self.remaining -= 1;
        self.next = Some(node.next);
        Some((id, &node.record))
    }
}
