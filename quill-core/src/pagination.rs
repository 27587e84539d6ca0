use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of page-number/ellipsis slots rendered between the previous and
/// next controls.
pub const DISPLAY_SLOTS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("invalid argument: page {active} is outside 1..={num_pages}")]
    InvalidArgument { num_pages: usize, active: usize },
}

/// One renderable unit of a pagination control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "page", rename_all = "snake_case")]
pub enum PageSlot {
    Numbered(usize),
    Ellipsis,
    /// Non-interactive filler keeping the control width constant.
    Placeholder,
}

impl PageSlot {
    pub fn page(&self) -> Option<usize> {
        match self {
            PageSlot::Numbered(page) => Some(*page),
            PageSlot::Ellipsis | PageSlot::Placeholder => None,
        }
    }
}

/// Validated `(num_pages, active_page)` pair. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    num_pages: usize,
    active_page: usize,
}

impl PaginationState {
    pub fn new(num_pages: usize, active_page: usize) -> Result<Self, PaginationError> {
        if num_pages < 1 || active_page < 1 || active_page > num_pages {
            return Err(PaginationError::InvalidArgument {
                num_pages,
                active: active_page,
            });
        }
        Ok(Self {
            num_pages,
            active_page,
        })
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    pub fn active_page(&self) -> usize {
        self.active_page
    }

    pub fn is_active(&self, page: usize) -> bool {
        page == self.active_page
    }

    /// Target of the "previous" control, `None` when it is disabled.
    pub fn previous_target(&self) -> Option<usize> {
        self.active_page.checked_sub(1).filter(|page| *page >= 1)
    }

    /// Target of the "next" control, `None` when it is disabled.
    pub fn next_target(&self) -> Option<usize> {
        Some(self.active_page + 1).filter(|page| *page <= self.num_pages)
    }

    pub fn plan(&self) -> Vec<PageSlot> {
        layout_slots(self.num_pages, self.active_page)
    }
}

/// Computes the slot sequence for `active_page` out of `num_pages`.
pub fn plan(num_pages: usize, active_page: usize) -> Result<Vec<PageSlot>, PaginationError> {
    PaginationState::new(num_pages, active_page).map(|state| state.plan())
}

pub fn previous_target(state: &PaginationState) -> Option<usize> {
    state.previous_target()
}

pub fn next_target(state: &PaginationState) -> Option<usize> {
    state.next_target()
}

/// Full render plan handed to a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationPlan {
    pub state: PaginationState,
    pub slots: Vec<PageSlot>,
    pub previous: Option<usize>,
    pub next: Option<usize>,
}

impl From<PaginationState> for PaginationPlan {
    fn from(state: PaginationState) -> Self {
        Self {
            slots: state.plan(),
            previous: state.previous_target(),
            next: state.next_target(),
            state,
        }
    }
}

fn layout_slots(num_pages: usize, active: usize) -> Vec<PageSlot> {
    use PageSlot::{Ellipsis, Numbered};

    if num_pages <= DISPLAY_SLOTS {
        let mut slots: Vec<PageSlot> = (1..=num_pages).map(Numbered).collect();
        slots.resize(DISPLAY_SLOTS, PageSlot::Placeholder);
        slots
    } else if active < 5 {
        vec![
            Numbered(1),
            Numbered(2),
            Numbered(3),
            Numbered(4),
            Numbered(5),
            Ellipsis,
            Numbered(num_pages),
        ]
    } else if active <= num_pages - 4 {
        vec![
            Numbered(1),
            Ellipsis,
            Numbered(active - 1),
            Numbered(active),
            Numbered(active + 1),
            Ellipsis,
            Numbered(num_pages),
        ]
    } else {
        let mut slots = vec![Numbered(1), Ellipsis];
        slots.extend((num_pages - 4..=num_pages).map(Numbered));
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PageSlot::{Ellipsis, Numbered, Placeholder};

    fn pages(slots: &[PageSlot]) -> Vec<Option<usize>> {
        slots.iter().map(PageSlot::page).collect()
    }

    #[test]
    fn small_page_counts_are_enumerated_and_padded() {
        for num_pages in 1..=DISPLAY_SLOTS {
            for active in 1..=num_pages {
                let slots = plan(num_pages, active).unwrap();
                assert_eq!(slots.len(), DISPLAY_SLOTS);
                assert!(!slots.contains(&Ellipsis));
                let expected: Vec<PageSlot> = (1..=num_pages)
                    .map(Numbered)
                    .chain(std::iter::repeat(Placeholder).take(DISPLAY_SLOTS - num_pages))
                    .collect();
                assert_eq!(slots, expected);
            }
        }
    }

    #[test]
    fn large_page_counts_always_show_first_and_last() {
        for num_pages in 8..=30 {
            for active in 1..=num_pages {
                let slots = plan(num_pages, active).unwrap();
                assert_eq!(slots.len(), DISPLAY_SLOTS, "{num_pages}/{active}");
                assert_eq!(slots.first(), Some(&Numbered(1)));
                assert_eq!(slots.last(), Some(&Numbered(num_pages)));
                assert!(!slots.contains(&Placeholder));
                assert!(slots.contains(&Numbered(active)));
            }
        }
    }

    #[test]
    fn ten_pages_switch_between_layouts() {
        assert_eq!(
            pages(&plan(10, 1).unwrap()),
            vec![Some(1), Some(2), Some(3), Some(4), Some(5), None, Some(10)]
        );
        assert_eq!(
            plan(10, 6).unwrap(),
            vec![
                Numbered(1),
                Ellipsis,
                Numbered(5),
                Numbered(6),
                Numbered(7),
                Ellipsis,
                Numbered(10)
            ]
        );
        assert_eq!(
            plan(10, 10).unwrap(),
            vec![
                Numbered(1),
                Ellipsis,
                Numbered(6),
                Numbered(7),
                Numbered(8),
                Numbered(9),
                Numbered(10)
            ]
        );
    }

    #[test]
    fn layout_boundaries() {
        // active 4 is still leading, 5 is the first centered page
        assert_eq!(plan(10, 4).unwrap()[5], Ellipsis);
        assert_eq!(plan(10, 5).unwrap()[1], Ellipsis);
        // num_pages - 4 is the last centered page
        assert_eq!(plan(10, 6).unwrap()[5], Ellipsis);
        assert_eq!(plan(10, 7).unwrap()[2], Numbered(6));
        assert_eq!(plan(10, 7).unwrap()[6], Numbered(10));
    }

    #[test]
    fn exactly_seven_pages_uses_enumerated_layout() {
        assert_eq!(
            plan(7, 6).unwrap(),
            (1..=7).map(Numbered).collect::<Vec<_>>()
        );
    }

    #[test]
    fn planning_is_pure() {
        assert_eq!(plan(42, 17).unwrap(), plan(42, 17).unwrap());
    }

    #[test]
    fn previous_and_next_targets() {
        let first = PaginationState::new(5, 1).unwrap();
        assert_eq!(previous_target(&first), None);
        assert_eq!(next_target(&first), Some(2));

        let last = PaginationState::new(5, 5).unwrap();
        assert_eq!(previous_target(&last), Some(4));
        assert_eq!(next_target(&last), None);

        let only = PaginationState::new(1, 1).unwrap();
        assert_eq!(only.previous_target(), None);
        assert_eq!(only.next_target(), None);
    }

    #[test]
    fn rejects_out_of_range_input() {
        assert_eq!(
            plan(0, 1),
            Err(PaginationError::InvalidArgument {
                num_pages: 0,
                active: 1
            })
        );
        assert!(plan(5, 0).is_err());
        assert!(plan(5, 6).is_err());
    }

    #[test]
    fn plan_serializes_with_tagged_slots() {
        let plan = PaginationPlan::from(PaginationState::new(3, 2).unwrap());
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["previous"], 1);
        assert_eq!(json["next"], 3);
        assert_eq!(json["slots"][0]["kind"], "numbered");
        assert_eq!(json["slots"][0]["page"], 1);
        assert_eq!(json["slots"][6]["kind"], "placeholder");
    }
}
