//! Frame-to-frame caches
//!
//! Both caches use the same generational scheme: entries touched during a
//! frame survive the next call to `frame`, everything else is released.

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};
use strata_core::{Affine2D, Rect};

use crate::driver::{BufferId, Device};

/// A cached device resource
pub trait Resource {
    fn release(&mut self, device: &mut dyn Device);
}

// ─────────────────────────────────────────────────────────────────────────────
// Resource cache
// ─────────────────────────────────────────────────────────────────────────────

/// Device resources keyed by the client object they were made from
pub struct ResourceCache<K, V> {
    res: FxHashMap<K, V>,
    /// Keys used or inserted this frame.
    new_res: FxHashSet<K>,
}

impl<K: Copy + Eq + Hash, V: Resource> Default for ResourceCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash, V: Resource> ResourceCache<K, V> {
    pub fn new() -> Self {
        Self {
            res: FxHashMap::default(),
            new_res: FxHashSet::default(),
        }
    }

    /// Look up a resource and keep it alive for another frame.
    pub fn get(&mut self, key: K) -> Option<&mut V> {
        let v = self.res.get_mut(&key)?;
        self.new_res.insert(key);
        Some(v)
    }

    /// Insert a resource created this frame.
    ///
    /// # Panics
    ///
    /// If `key` was already put during this frame.
    pub fn put(&mut self, key: K, val: V) {
        assert!(self.new_res.insert(key), "resource cache key put twice in a frame");
        self.res.insert(key, val);
    }

    /// Look up a resource, inserting the one made by `make` if missing.
    pub fn get_or_put(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        self.new_res.insert(key);
        self.res.entry(key).or_insert_with(make)
    }

    pub fn len(&self) -> usize {
        self.res.len()
    }

    pub fn is_empty(&self) -> bool {
        self.res.is_empty()
    }

    /// Release every resource not used since the last frame.
    pub fn frame(&mut self, device: &mut dyn Device) {
        let new_res = &self.new_res;
        self.res.retain(|k, v| {
            let keep = new_res.contains(k);
            if !keep {
                v.release(device);
            }
            keep
        });
        self.new_res.clear();
    }

    pub fn release(&mut self, device: &mut dyn Device) {
        self.frame(device);
        for (_, mut v) in self.res.drain() {
            v.release(device);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Path cache
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of an encoded clip path including everything that shapes its
/// vertices
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OpKey {
    /// Hash of the path data, or of the rectangle for rectangular clips.
    pub content: u64,
    pub outline: bool,
    /// Stroke width bits.
    pub stroke_width: u32,
    /// Bits of the linear part `(sx, hx, sy, hy)` of the transform.
    pub linear: [u32; 4],
}

impl OpKey {
    pub fn new(content: u64) -> Self {
        Self {
            content,
            ..Default::default()
        }
    }

    /// The key for the same path under another linear transform. Offsets do
    /// not change the vertices.
    pub fn with_transform(self, t: &Affine2D) -> Self {
        let (sx, hx, _, hy, sy, _) = t.elems();
        Self {
            linear: [sx.to_bits(), hx.to_bits(), sy.to_bits(), hy.to_bits()],
            ..self
        }
    }
}

/// Vertex buffer of a path
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PathData {
    /// Number of vertices, four per quad.
    pub ncurves: usize,
    pub buffer: Option<BufferId>,
}

impl Resource for PathData {
    fn release(&mut self, device: &mut dyn Device) {
        if let Some(buffer) = self.buffer.take() {
            device.release_buffer(buffer);
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OpCacheValue {
    pub data: PathData,
    pub bounds: Rect,
    key: OpKey,
    keep: bool,
}

/// Path vertex buffers and bounds, kept while their paths are drawn
#[derive(Default)]
pub struct OpCache {
    index: FxHashMap<OpKey, usize>,
    cache: Vec<OpCacheValue>,
    freelist: Vec<usize>,
}

impl OpCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, key: &OpKey) -> Option<&OpCacheValue> {
        let v = &mut self.cache[*self.index.get(key)?];
        v.keep = true;
        Some(v)
    }

    pub fn put(&mut self, key: OpKey, data: PathData, bounds: Rect) {
        let val = OpCacheValue {
            data,
            bounds,
            key,
            keep: true,
        };
        match self.index.get(&key) {
            Some(&i) => self.cache[i] = val,
            None => {
                let i = match self.freelist.pop() {
                    Some(i) => {
                        self.cache[i] = val;
                        i
                    }
                    None => {
                        self.cache.push(val);
                        self.cache.len() - 1
                    }
                };
                self.index.insert(key, i);
            }
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Drop entries not used since the last frame.
    pub fn frame(&mut self, device: &mut dyn Device) {
        self.freelist.clear();
        for (i, v) in self.cache.iter_mut().enumerate() {
            if std::mem::take(&mut v.keep) {
                continue;
            }
            v.data.release(device);
            // Freed slots keep their old key; only unlink it if it still
            // points here.
            if self.index.get(&v.key) == Some(&i) {
                self.index.remove(&v.key);
            }
            self.freelist.push(i);
        }
    }

    pub fn release(&mut self, device: &mut dyn Device) {
        for v in &mut self.cache {
            v.keep = false;
        }
        self.frame(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::BufferBinding;
    use crate::headless::HeadlessDevice;

    struct Counted(std::rc::Rc<std::cell::Cell<u32>>);

    impl Resource for Counted {
        fn release(&mut self, _device: &mut dyn Device) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn path_data(device: &mut HeadlessDevice) -> PathData {
        let buffer = device
            .new_immutable_buffer(BufferBinding::VERTICES, &[0u8; 128])
            .unwrap();
        PathData {
            ncurves: 4,
            buffer: Some(buffer),
        }
    }

    #[test]
    fn test_resource_cache_generations() {
        let mut device = HeadlessDevice::new();
        let released = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut cache = ResourceCache::new();
        cache.put(1u64, Counted(released.clone()));
        cache.put(2u64, Counted(released.clone()));
        cache.frame(&mut device);
        assert_eq!(cache.len(), 2);
        assert_eq!(released.get(), 0);

        // Only key 1 is used in the second frame.
        assert!(cache.get(1).is_some());
        cache.frame(&mut device);
        assert_eq!(cache.len(), 1);
        assert_eq!(released.get(), 1);

        cache.frame(&mut device);
        assert!(cache.is_empty());
        assert_eq!(released.get(), 2);
        assert!(cache.get(1).is_none());
    }

    #[test]
    #[should_panic(expected = "put twice")]
    fn test_resource_cache_double_put() {
        let released = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut cache = ResourceCache::new();
        cache.put(1u64, Counted(released.clone()));
        cache.put(1u64, Counted(released));
    }

    #[test]
    fn test_resource_cache_release() {
        let mut device = HeadlessDevice::new();
        let released = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut cache = ResourceCache::new();
        cache.put(1u64, Counted(released.clone()));
        cache.release(&mut device);
        assert!(cache.is_empty());
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn test_op_key_ignores_offset() {
        let key = OpKey::new(42);
        let a = key.with_transform(&Affine2D::scaling(2.0, 2.0));
        let b = key.with_transform(&Affine2D::scaling(2.0, 2.0).offset(strata_core::Point::new(5.0, 5.0)));
        assert_eq!(a, b);
        assert_ne!(a, key.with_transform(&Affine2D::scaling(3.0, 2.0)));
    }

    #[test]
    fn test_op_cache_keeps_used_entries() {
        let mut device = HeadlessDevice::new();
        let mut cache = OpCache::new();
        let (k1, k2) = (OpKey::new(1), OpKey::new(2));
        let d1 = path_data(&mut device);
        cache.put(k1, d1, Rect::new(0.0, 0.0, 1.0, 1.0));
        cache.put(k2, path_data(&mut device), Rect::new(0.0, 0.0, 2.0, 2.0));
        cache.frame(&mut device);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.get(&k1).map(|v| v.bounds), Some(Rect::new(0.0, 0.0, 1.0, 1.0)));
        cache.frame(&mut device);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&k2).is_none());
        assert_eq!(device.live_buffers(), 1);
        assert_eq!(cache.get(&k1).map(|v| v.data), Some(d1));
    }

    #[test]
    fn test_op_cache_reuses_slots() {
        let mut device = HeadlessDevice::new();
        let mut cache = OpCache::new();
        let (k1, k2, k3) = (OpKey::new(1), OpKey::new(2), OpKey::new(3));
        cache.put(k1, PathData::default(), Rect::ZERO);
        cache.put(k2, PathData::default(), Rect::ZERO);
        cache.frame(&mut device);
        cache.get(&k2);
        cache.frame(&mut device);

        // k1's slot is reused for k3.
        cache.put(k3, PathData::default(), Rect::ZERO);
        assert_eq!(cache.cache.len(), 2);
        assert!(cache.get(&k2).is_some());
        assert!(cache.get(&k1).is_none());
    }

    #[test]
    fn test_op_cache_stale_slot_keeps_moved_key() {
        let mut device = HeadlessDevice::new();
        let mut cache = OpCache::new();
        let (k1, k2) = (OpKey::new(1), OpKey::new(2));
        cache.put(k1, PathData::default(), Rect::ZERO);
        cache.put(k2, PathData::default(), Rect::ZERO);
        cache.frame(&mut device);
        cache.frame(&mut device);
        assert!(cache.is_empty());

        // k1 comes back in slot 1 while slot 0 still names it.
        cache.put(k1, PathData::default(), Rect::new(0.0, 0.0, 1.0, 1.0));
        cache.frame(&mut device);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get(&k1).map(|v| v.bounds),
            Some(Rect::new(0.0, 0.0, 1.0, 1.0))
        );
    }

    #[test]
    fn test_op_cache_release() {
        let mut device = HeadlessDevice::new();
        let mut cache = OpCache::new();
        let data = path_data(&mut device);
        cache.put(OpKey::new(1), data, Rect::ZERO);
        cache.release(&mut device);
        assert!(cache.is_empty());
        assert_eq!(device.live_buffers(), 0);
    }
}
