use std::sync::Arc;

use parking_lot::RwLock;

/// Provides the size of the render surface in physical pixels.
pub trait ViewportProvider: Send + Sync {
    fn viewport_size(&self) -> (u32, u32);

    fn aspect_ratio(&self) -> f32 {
        let (width, height) = self.viewport_size();
        if height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        }
    }
}

/// Viewport that always reports the same resolution.
#[derive(Debug, Clone, Copy)]
pub struct StaticViewport {
    pub width: u32,
    pub height: u32,
}

impl StaticViewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl ViewportProvider for StaticViewport {
    fn viewport_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Viewport tracking a live window or canvas; updated on resize.
#[derive(Debug)]
pub struct WindowViewport {
    size: RwLock<(u32, u32)>,
}

impl WindowViewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: RwLock::new((width.max(1), height.max(1))),
        }
    }

    pub fn update(&self, width: u32, height: u32) {
        *self.size.write() = (width.max(1), height.max(1));
    }
}

impl ViewportProvider for WindowViewport {
    fn viewport_size(&self) -> (u32, u32) {
        *self.size.read()
    }
}

impl<T> ViewportProvider for Arc<T>
where
    T: ViewportProvider + ?Sized,
{
    fn viewport_size(&self) -> (u32, u32) {
        (**self).viewport_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_viewport_never_reports_zero_area() {
        let viewport = WindowViewport::new(800, 600);
        viewport.update(0, 0);
        assert_eq!(viewport.viewport_size(), (1, 1));
    }

    #[test]
    fn aspect_ratio_follows_size() {
        let viewport = StaticViewport::new(1280, 720);
        assert!((viewport.aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
    }
}
