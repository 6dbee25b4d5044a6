//! Output-size selection.
//!
//! Selection is total over any non-empty size set and independent of the
//! order in which the platform reports sizes.

use serde::{Deserialize, Serialize};

use super::Size;
use crate::session::SessionError;

/// Policy for picking the still-image output size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizePolicy {
    /// Always take the largest-area supported size.
    #[default]
    LargestArea,
    /// Take `preferred` if supported, else `display` if supported, else the largest area.
    PreferFixed {
        /// Fixed size to use when the camera supports it.
        preferred: Size,
        /// Display resolution of the device, if known.
        #[serde(default)]
        display: Option<Size>,
    },
}

impl SizePolicy {
    /// The 1080p preference used by preview-oriented sessions.
    pub fn full_hd(display: Option<Size>) -> Self {
        Self::PreferFixed {
            preferred: Size::new(1920, 1080),
            display,
        }
    }
}

/// Picks exactly one output size from `available` according to `policy`.
///
/// Fails with [`SessionError::NoSupportedOutputSize`] when `available` is empty.
pub fn resolve_output_size(available: &[Size], policy: &SizePolicy) -> Result<Size, SessionError> {
    let largest = largest_area(available).ok_or(SessionError::NoSupportedOutputSize)?;

    let chosen = match policy {
        SizePolicy::LargestArea => largest,
        SizePolicy::PreferFixed { preferred, display } => {
            if available.contains(preferred) {
                *preferred
            } else {
                match display {
                    Some(display) if available.contains(display) => *display,
                    _ => largest,
                }
            }
        }
    };

    tracing::debug!(size = %chosen, candidates = available.len(), "Resolved output size");
    Ok(chosen)
}

fn largest_area(available: &[Size]) -> Option<Size> {
    // Width breaks area ties so the result never depends on input order.
    available
        .iter()
        .copied()
        .max_by_key(|size| (size.area(), size.width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sizes() -> Vec<Size> {
        vec![
            Size::new(640, 480),
            Size::new(1920, 1080),
            Size::new(3840, 2160),
        ]
    }

    #[test]
    fn test_largest_area_policy() {
        let size = resolve_output_size(&sizes(), &SizePolicy::LargestArea).unwrap();
        assert_eq!(size, Size::new(3840, 2160));
    }

    #[test]
    fn test_preferred_size_wins_when_supported() {
        let policy = SizePolicy::full_hd(None);
        let size = resolve_output_size(&sizes(), &policy).unwrap();
        assert_eq!(size, Size::new(1920, 1080));
    }

    #[test]
    fn test_display_fallback_without_preferred() {
        let available = vec![
            Size::new(640, 480),
            Size::new(1280, 720),
            Size::new(4000, 3000),
        ];
        let policy = SizePolicy::full_hd(Some(Size::new(1280, 720)));
        let size = resolve_output_size(&available, &policy).unwrap();
        assert_eq!(size, Size::new(1280, 720));
    }

    #[test]
    fn test_largest_fallback_when_display_unsupported() {
        let available = vec![Size::new(640, 480), Size::new(4000, 3000)];
        let policy = SizePolicy::full_hd(Some(Size::new(1280, 720)));
        let size = resolve_output_size(&available, &policy).unwrap();
        assert_eq!(size, Size::new(4000, 3000));
    }

    #[test]
    fn test_empty_set_is_an_error() {
        assert!(matches!(
            resolve_output_size(&[], &SizePolicy::LargestArea),
            Err(SessionError::NoSupportedOutputSize)
        ));
        assert!(matches!(
            resolve_output_size(&[], &SizePolicy::full_hd(Some(Size::new(1920, 1080)))),
            Err(SessionError::NoSupportedOutputSize)
        ));
    }

    #[test]
    fn test_equal_area_ties_break_on_width() {
        let available = vec![Size::new(1200, 1600), Size::new(1600, 1200)];
        let size = resolve_output_size(&available, &SizePolicy::LargestArea).unwrap();
        assert_eq!(size, Size::new(1600, 1200));
    }

    fn arb_sizes() -> impl Strategy<Value = Vec<Size>> {
        prop::collection::vec((1u32..5000, 1u32..5000), 1..16)
            .prop_map(|dims| dims.into_iter().map(|(w, h)| Size::new(w, h)).collect())
    }

    proptest! {
        #[test]
        fn prop_selection_is_order_independent(available in arb_sizes()) {
            let policy = SizePolicy::full_hd(available.first().copied());
            let forward = resolve_output_size(&available, &policy).unwrap();

            let mut reversed = available.clone();
            reversed.reverse();
            let backward = resolve_output_size(&reversed, &policy).unwrap();

            prop_assert_eq!(forward, backward);
            prop_assert!(available.contains(&forward));
        }
    }
}
