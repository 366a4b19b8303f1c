//! Layout planning
//!
//! Assigns each label, in stream order, to a page and slot. Pages fill their
//! default slots in order unless a per-page override lists which slots to
//! use (and so how many labels the page takes). When a page is full the
//! planner rolls over to the next one; a new output page is requested only
//! if another label is coming, so no trailing empty page is ever produced.

use std::collections::BTreeMap;
use tracing::debug;

use crate::config::LayoutConfig;
use crate::error::Result;
use crate::geometry::SlotOffset;

/// Destination of one label: output page plus translation after scaling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementSlot {
    /// 0-based, never decreases over a run
    pub page_index: usize,
    pub offset: SlotOffset,
}

/// One planner step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub slot: PlacementSlot,
    /// Index into the slot sequence that was used
    pub slot_index: usize,
    /// This label filled its page
    pub rolled_over: bool,
    /// A blank page must be appended before the next label
    pub append_page: bool,
}

#[derive(Debug, Clone)]
pub struct LayoutPlanner {
    slots: Vec<SlotOffset>,
    slots_per_page: usize,
    overrides: BTreeMap<usize, Vec<usize>>,
    page_index: usize,
    slot_cursor: usize,
    override_cursor: usize,
    /// Override for `page_index`, resolved when the page begins
    active_override: Option<Vec<usize>>,
    placed: usize,
}

impl LayoutPlanner {
    pub fn new(layout: &LayoutConfig) -> Result<Self> {
        layout.validate()?;
        let overrides = layout.override_map();
        let active_override = overrides.get(&0).cloned();
        Ok(Self {
            slots: layout.slots.clone(),
            slots_per_page: layout.capacity(),
            overrides,
            page_index: 0,
            slot_cursor: 0,
            override_cursor: 0,
            active_override,
            placed: 0,
        })
    }

    /// Plan a stream of known length
    pub fn plan(layout: &LayoutConfig, count: usize) -> Result<Vec<Placement>> {
        let mut planner = Self::new(layout)?;
        Ok((0..count).map(|i| planner.assign(i + 1 < count)).collect())
    }

    /// Page the next label will land on
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Labels assigned so far
    pub fn placed(&self) -> usize {
        self.placed
    }

    /// Labels the current page takes in total
    pub fn current_capacity(&self) -> usize {
        self.active_override
            .as_ref()
            .map_or(self.slots_per_page, Vec::len)
    }

    /// Assign the next label. `more_remaining` tells whether another label
    /// follows this one.
    pub fn assign(&mut self, more_remaining: bool) -> Placement {
        let slot_index = match &self.active_override {
            Some(order) => order[self.override_cursor],
            None => self.slot_cursor,
        };
        let slot = PlacementSlot {
            page_index: self.page_index,
            offset: self.slots[slot_index],
        };
        self.placed += 1;

        let cursor = if self.active_override.is_some() {
            self.override_cursor += 1;
            self.override_cursor
        } else {
            self.slot_cursor += 1;
            self.slot_cursor
        };

        let rolled_over = cursor == self.current_capacity();
        let append_page = rolled_over && more_remaining;
        if rolled_over {
            self.slot_cursor = 0;
            self.override_cursor = 0;
            self.page_index += 1;
            self.active_override = self.overrides.get(&self.page_index).cloned();
            debug!(
                "Page {} full after label {}, next page {}",
                slot.page_index + 1,
                self.placed,
                if append_page { "allocated" } else { "not needed" }
            );
        }

        Placement {
            slot,
            slot_index,
            rolled_over,
            append_page,
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::config::PageOverride;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn arb_override(slot_count: usize) -> impl Strategy<Value = Vec<usize>> {
        Just((0..slot_count).collect::<Vec<_>>())
            .prop_shuffle()
            .prop_flat_map(move |all| (1..=slot_count).prop_map(move |k| all[..k].to_vec()))
    }

    fn arb_layout() -> impl Strategy<Value = LayoutConfig> {
        (
            1usize..=4,
            prop::collection::btree_map(0usize..6, arb_override(4), 0..4),
        )
            .prop_map(|(capacity, overrides)| LayoutConfig {
                slots_per_page: Some(capacity),
                overrides: overrides
                    .into_iter()
                    .map(|(page, slots)| PageOverride { page, slots })
                    .collect(),
                ..LayoutConfig::default()
            })
    }

    proptest! {
        /// Property: pages never go backwards and never exceed their capacity
        #[test]
        fn pages_monotonic_and_within_capacity(config in arb_layout(), count in 1usize..40) {
            let placements = LayoutPlanner::plan(&config, count).unwrap();
            let overrides = config.override_map();

            let mut per_page: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            let mut last_page = 0;
            for p in &placements {
                prop_assert!(p.slot.page_index >= last_page);
                last_page = p.slot.page_index;
                per_page.entry(p.slot.page_index).or_default().push(p.slot_index);
            }
            for (page, slots) in &per_page {
                let capacity = overrides.get(page).map_or(config.capacity(), Vec::len);
                prop_assert!(slots.len() <= capacity);
                let distinct: BTreeSet<_> = slots.iter().collect();
                prop_assert_eq!(distinct.len(), slots.len());
            }
        }

        /// Property: a page holds exactly its override length before rollover
        #[test]
        fn override_length_decides_rollover(config in arb_layout(), count in 1usize..40) {
            let placements = LayoutPlanner::plan(&config, count).unwrap();
            let overrides = config.override_map();
            let last_page = placements.last().unwrap().slot.page_index;

            for page in 0..last_page {
                let on_page = placements.iter().filter(|p| p.slot.page_index == page).count();
                let capacity = overrides.get(&page).map_or(config.capacity(), Vec::len);
                prop_assert_eq!(on_page, capacity);
            }
        }

        /// Property: pages requested = pages used - 1, so no page is left empty
        #[test]
        fn no_empty_trailing_page(config in arb_layout(), count in 1usize..40) {
            let placements = LayoutPlanner::plan(&config, count).unwrap();
            let appended = placements.iter().filter(|p| p.append_page).count();
            let last_page = placements.last().unwrap().slot.page_index;
            prop_assert_eq!(1 + appended, last_page + 1);
        }

        /// Property: planning is a pure function of count and configuration
        #[test]
        fn planning_is_deterministic(config in arb_layout(), count in 0usize..40) {
            let first = LayoutPlanner::plan(&config, count).unwrap();
            let second = LayoutPlanner::plan(&config, count).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
