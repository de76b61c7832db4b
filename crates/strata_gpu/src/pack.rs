//! Atlas packing
//!
//! A guillotine packer placing rectangles on pages no larger than a maximum
//! size. Each placement splits the free space it was taken from into the
//! remainder below it and the remainder to its right.

use strata_core::{IPoint, IRect};

/// Free space of a fresh page; pages grow into it up to the maximum size.
const PAGE_SPACE: i32 = 1_000_000;

/// Where a rectangle landed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Placement {
    /// Page index.
    pub idx: usize,
    pub pos: IPoint,
}

#[derive(Debug)]
pub struct Packer {
    max_dims: IPoint,
    spaces: Vec<IRect>,
    /// Used extent of each page.
    sizes: Vec<IPoint>,
}

impl Packer {
    pub fn new(max_dims: IPoint) -> Self {
        Self {
            max_dims,
            spaces: Vec::new(),
            sizes: Vec::new(),
        }
    }

    pub fn max_dims(&self) -> IPoint {
        self.max_dims
    }

    /// Sizes of the pages used so far.
    pub fn sizes(&self) -> &[IPoint] {
        &self.sizes
    }

    pub fn clear(&mut self) {
        self.sizes.clear();
        self.spaces.clear();
    }

    /// Place a rectangle of size `s`, opening a new page when the current one
    /// is full. `None` if `s` exceeds the maximum page size.
    pub fn add(&mut self, s: IPoint) -> Option<Placement> {
        if let Some(place) = self.try_add(s) {
            return Some(place);
        }
        self.new_page();
        self.try_add(s)
    }

    fn new_page(&mut self) {
        self.sizes.push(IPoint::ZERO);
        self.spaces.clear();
        self.spaces.push(IRect::new(0, 0, PAGE_SPACE, PAGE_SPACE));
    }

    fn try_add(&mut self, s: IPoint) -> Option<Placement> {
        let last_size = *self.sizes.last()?;
        let area = |p: IPoint| p.x as i64 * p.y as i64;

        // Prefer the space that grows the page the least.
        let mut best: Option<(usize, IPoint)> = None;
        for (i, space) in self.spaces.iter().enumerate() {
            if space.dx() < s.x || space.dy() < s.y {
                continue;
            }
            let mut size = last_size;
            let x = space.min.x + s.x;
            if x > size.x {
                if x > self.max_dims.x {
                    continue;
                }
                size.x = x;
            }
            let y = space.min.y + s.y;
            if y > size.y {
                if y > self.max_dims.y {
                    continue;
                }
                size.y = y;
            }
            if best.map_or(true, |(_, b)| area(size) < area(b)) {
                best = Some((i, size));
            }
        }
        let (idx, size) = best?;

        let space = self.spaces.swap_remove(idx);
        let pos = space.min;
        let bottom = IRect {
            min: IPoint::new(pos.x, pos.y + s.y),
            max: space.max,
        };
        let right = IRect {
            min: IPoint::new(pos.x + s.x, pos.y),
            max: IPoint::new(space.max.x, pos.y + s.y),
        };
        for r in [bottom, right] {
            if !r.is_empty() {
                self.spaces.push(r);
            }
        }

        let page = self.sizes.len() - 1;
        self.sizes[page] = size;
        Some(Placement { idx: page, pos })
    }
}
