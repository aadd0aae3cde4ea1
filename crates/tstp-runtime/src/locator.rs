//! Node position
//!
//! Positioning itself is outside the protocol; the protocol only reads
//! the current estimate and its confidence.

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::RwLock;

use tstp_core::Space;

/// Source of the node's own coordinates
pub trait Locator: Send + Sync {
    /// Current position in the sink-relative frame
    fn here(&self) -> Space;

    /// Confidence in `here()`, percent
    fn confidence(&self) -> u8;

    /// Sink-relative coordinates to the absolute frame
    fn absolute(&self, local: Space) -> Space;

    /// Adopt the sink's absolute coordinates advertised by an Epoch
    fn set_reference(&self, sink: Space);
}

/// Locator for nodes with a surveyed, fixed position
#[derive(Debug)]
pub struct StaticLocator {
    here: RwLock<Space>,
    confidence: AtomicU8,
    reference: RwLock<Space>,
}

impl StaticLocator {
    pub fn new(here: Space, confidence: u8) -> Self {
        StaticLocator {
            here: RwLock::new(here),
            confidence: AtomicU8::new(confidence.min(100)),
            reference: RwLock::new(Space::SINK),
        }
    }

    /// Fully confident locator
    pub fn fixed(here: Space) -> Self {
        Self::new(here, 100)
    }

    pub fn move_to(&self, here: Space) {
        *self.here.write() = here;
    }

    pub fn set_confidence(&self, confidence: u8) {
        self.confidence.store(confidence.min(100), Ordering::Relaxed);
    }

    /// Sink's absolute coordinates
    pub fn reference(&self) -> Space {
        *self.reference.read()
    }
}

impl Locator for StaticLocator {
    fn here(&self) -> Space {
        *self.here.read()
    }

    fn confidence(&self) -> u8 {
        self.confidence.load(Ordering::Relaxed)
    }

    fn absolute(&self, local: Space) -> Space {
        let r = self.reference();
        Space::new(
            r.x.saturating_add(local.x),
            r.y.saturating_add(local.y),
            r.z.saturating_add(local.z),
        )
    }

    fn set_reference(&self, sink: Space) {
        let mut reference = self.reference.write();
        if *reference != sink {
            tracing::info!(?sink, "Adopted sink coordinates");
            *reference = sink;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_locator() {
        let locator = StaticLocator::new(Space::new(5, 0, 0), 120);
        assert_eq!(locator.confidence(), 100);
        locator.set_confidence(40);
        assert_eq!(locator.confidence(), 40);

        assert_eq!(locator.absolute(Space::new(5, 0, 0)), Space::new(5, 0, 0));
        locator.set_reference(Space::new(1_000, 2_000, -3));
        assert_eq!(locator.absolute(Space::new(5, 0, 0)), Space::new(1_005, 2_000, -3));

        locator.move_to(Space::new(6, 1, 0));
        assert_eq!(locator.here(), Space::new(6, 1, 0));
    }
}
