use serde::Serialize;

/// Axis-aligned box in page pixels, as reported by the automation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Zero (or negative, or NaN) width/height.
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Same box expressed relative to `origin`'s top-left corner.
    pub fn relative_to(&self, origin: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x: self.x - origin.x,
            y: self.y - origin.y,
            width: self.width,
            height: self.height,
        }
    }
}

/// One keypad button: the handle to click later and where it was drawn.
#[derive(Debug, Clone)]
pub struct ButtonCandidate<E> {
    pub element: E,
    pub bounding_box: BoundingBox,
}

/// Keep buttons with a usable box and order them rows top-to-bottom,
/// left-to-right within a row.
///
/// Buttons without a box or with zero area are dropped silently; they are
/// control keys that never rendered or hidden placeholders. Returns `None`
/// when nothing survives, which the decoder treats as a fatal condition.
pub fn locate_buttons<E>(
    raw: impl IntoIterator<Item = (E, Option<BoundingBox>)>,
) -> Option<Vec<ButtonCandidate<E>>> {
    let mut candidates: Vec<ButtonCandidate<E>> = raw
        .into_iter()
        .filter_map(|(element, bbox)| match bbox {
            Some(bbox) if !bbox.is_degenerate() => Some(ButtonCandidate {
                element,
                bounding_box: bbox,
            }),
            Some(bbox) => {
                tracing::debug!(
                    "skipping degenerate button at ({:.0}, {:.0}) {}x{}",
                    bbox.x,
                    bbox.y,
                    bbox.width,
                    bbox.height
                );
                None
            }
            None => None,
        })
        .collect();

    if candidates.is_empty() {
        return None;
    }

    // Stable sort on (y, x) so equal rows keep page order
    candidates.sort_by(|a, b| {
        let (ay, ax) = (a.bounding_box.y, a.bounding_box.x);
        let (by, bx) = (b.bounding_box.y, b.bounding_box.x);
        ay.total_cmp(&by).then(ax.total_cmp(&bx))
    });

    Some(candidates)
}
