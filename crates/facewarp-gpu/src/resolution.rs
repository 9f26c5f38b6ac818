//! Types for representing image resolutions.

use std::fmt;

/// Resolution (`width x height`) of a camera frame, render target, or display.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// 720p resolution: `1280x720`
    pub const RES_720P: Self = Self {
        width: 1280,
        height: 720,
    };

    /// Creates a new [`Resolution`] of `width x height`.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the width of this [`Resolution`].
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of this [`Resolution`].
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns the resolution with width and height exchanged.
    #[inline]
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }

    /// Divides both dimensions by `factor`, keeping each of them at least 1 pixel wide.
    pub fn shrink(&self, factor: u32) -> Self {
        let factor = factor.max(1);
        Self::new((self.width / factor).max(1), (self.height / factor).max(1))
    }

    /// Computes the [`AspectRatio`] of this [`Resolution`].
    ///
    /// If `self` has a width or height of 0, `None` is returned.
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        AspectRatio::new(self.width(), self.height())
    }

    /// Returns whether this resolution is taller than it is wide.
    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// Ratio of a width to a height of an image.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct AspectRatio {
    // Invariant: `width` and `height` are nonzero and their GCD is 1.
    width: u32,
    height: u32,
}

impl AspectRatio {
    /// Creates the aspect ratio representing `width:height`.
    ///
    /// If either `width` or `height` is `0`, returns `None`.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        let gcd = gcd(width, height);
        Some(Self {
            width: width / gcd,
            height: height / gcd,
        })
    }

    /// Returns the ratio with width and height exchanged.
    pub fn inverted(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Returns the `f32` corresponding to this ratio.
    #[inline]
    pub fn as_f32(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl fmt::Debug for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b > 0 {
        let t = b;
        b = a % b;
        a = t;
    }

    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(6, 9), 3);
        assert_eq!(1280 / gcd(1280, 720), 16);
        assert_eq!(gcd(0, 7), 7);
    }

    #[test]
    fn camera_aspect_ratios() {
        let landscape = AspectRatio::new(1280, 720).unwrap();
        assert_eq!(landscape.to_string(), "16:9");
        assert_eq!(landscape.inverted().to_string(), "9:16");
        assert_eq!(AspectRatio::new(0, 720), None);
    }

    #[test]
    fn shrink_never_reaches_zero() {
        assert_eq!(Resolution::new(1280, 720).shrink(4), Resolution::new(320, 180));
        assert_eq!(Resolution::new(3, 2).shrink(4), Resolution::new(1, 1));
        assert_eq!(Resolution::new(8, 8).shrink(0), Resolution::new(8, 8));
    }

    #[test]
    fn transpose() {
        let res = Resolution::new(1280, 720);
        assert!(!res.is_portrait());
        assert!(res.transposed().is_portrait());
        assert_eq!(res.transposed().transposed(), res);
    }
}
