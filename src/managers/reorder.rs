//! Reordering Engine.
//!
//! Pure functions from (current entries, move request) to the next entries
//! with positions renumbered so every container holds exactly
//! `0..n-1`. Nothing here performs I/O.

use crate::managers::collection::{Positioned, Relocatable};
use crate::types::bookmark::MoveDescriptor;
use crate::types::errors::ReorderError;

/// Result of a reorder computation.
#[derive(Debug, Clone, PartialEq)]
pub struct MovePlan<T> {
    /// The full next list.
    pub items: Vec<T>,
    /// Ids whose container or position differs from the input, in the
    /// order they were touched.
    pub changed: Vec<String>,
}

impl<T: Positioned> MovePlan<T> {
    fn unchanged(items: &[T]) -> Self {
        Self {
            items: items.to_vec(),
            changed: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }

    /// The next state of every changed entry.
    pub fn changed_rows(&self) -> Vec<T> {
        self.changed
            .iter()
            .filter_map(|id| self.items.iter().find(|item| item.id() == id))
            .cloned()
            .collect()
    }
}

fn find_index<T: Positioned>(items: &[T], id: &str) -> Result<usize, ReorderError> {
    items
        .iter()
        .position(|item| item.id() == id)
        .ok_or_else(|| ReorderError::ItemNotFound(id.to_string()))
}

/// Indices into `items` of one container's entries, ascending by position.
/// Ties keep input order.
pub fn container_order<T: Positioned>(items: &[T], container: Option<&str>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len())
        .filter(|&i| items[i].container() == container)
        .collect();
    order.sort_by_key(|&i| items[i].position());
    order
}

fn mark_changed(changed: &mut Vec<String>, id: &str) {
    if !changed.iter().any(|c| c == id) {
        changed.push(id.to_string());
    }
}

/// The stored position for slot `index` of a container.
pub fn position_for_slot(index: usize) -> Result<i32, ReorderError> {
    i32::try_from(index).map_err(|_| ReorderError::IndexOutOfRange(index))
}

/// Sets each entry in `order` to its index, recording the ones that moved.
fn renumber<T: Positioned>(
    items: &mut [T],
    order: &[usize],
    changed: &mut Vec<String>,
) -> Result<(), ReorderError> {
    for (slot, &index) in order.iter().enumerate() {
        let position = position_for_slot(slot)?;
        if items[index].position() != position {
            items[index].set_position(position);
            mark_changed(changed, items[index].id());
        }
    }
    Ok(())
}

/// Position for an entry appended to `container`.
///
/// One past the highest position present, so it equals the entry count
/// when the container is contiguous and never collides after a removal
/// left a gap.
pub fn append_position<T: Positioned>(items: &[T], container: Option<&str>) -> i32 {
    items
        .iter()
        .filter(|item| item.container() == container)
        .map(|item| item.position() + 1)
        .max()
        .unwrap_or(0)
}

/// Moves `item_id` to `target_index` inside its own container.
///
/// An index past the end is clamped to the last slot. Moving an entry to
/// the index it already occupies returns the input untouched.
pub fn move_within<T: Positioned>(
    items: &[T],
    item_id: &str,
    target_index: usize,
) -> Result<MovePlan<T>, ReorderError> {
    let index = find_index(items, item_id)?;
    let mut order = container_order(items, items[index].container());
    let current = order
        .iter()
        .position(|&i| i == index)
        .ok_or_else(|| ReorderError::ItemNotFound(item_id.to_string()))?;

    let target = target_index.min(order.len() - 1);
    if target == current {
        return Ok(MovePlan::unchanged(items));
    }

    let moved = order.remove(current);
    order.insert(target, moved);

    let mut next = items.to_vec();
    let mut changed = Vec::new();
    renumber(&mut next, &order, &mut changed)?;
    Ok(MovePlan { items: next, changed })
}

/// Moves `item_id` into `target_container` at `target_index`.
///
/// The source container is renumbered to close the gap, the target opens a
/// slot at the clamped index. Falls back to [`move_within`] when the
/// target is the current container.
pub fn move_across<T: Relocatable>(
    items: &[T],
    item_id: &str,
    target_container: Option<&str>,
    target_index: usize,
) -> Result<MovePlan<T>, ReorderError> {
    let index = find_index(items, item_id)?;
    let source = items[index].container().map(str::to_string);
    if source.as_deref() == target_container {
        return move_within(items, item_id, target_index);
    }

    let source_order: Vec<usize> = container_order(items, source.as_deref())
        .into_iter()
        .filter(|&i| i != index)
        .collect();
    let mut target_order = container_order(items, target_container);
    let slot = target_index.min(target_order.len());
    target_order.insert(slot, index);

    let mut next = items.to_vec();
    let mut changed = vec![item_id.to_string()];
    next[index].set_container(target_container.map(str::to_string));
    renumber(&mut next, &source_order, &mut changed)?;
    renumber(&mut next, &target_order, &mut changed)?;
    Ok(MovePlan { items: next, changed })
}

/// Applies a move descriptor, choosing the within- or cross-container path.
pub fn apply_move<T: Relocatable>(
    items: &[T],
    descriptor: &MoveDescriptor,
) -> Result<MovePlan<T>, ReorderError> {
    move_across(
        items,
        &descriptor.item_id,
        descriptor.target_folder.as_deref(),
        descriptor.target_index,
    )
}

/// Moves the entry at index `from` of a container's ordered list to `to`.
pub fn move_by_index<T: Positioned>(
    items: &[T],
    container: Option<&str>,
    from: usize,
    to: usize,
) -> Result<MovePlan<T>, ReorderError> {
    let order = container_order(items, container);
    let &index = order.get(from).ok_or(ReorderError::IndexOutOfRange(from))?;
    let id = items[index].id().to_string();
    move_within(items, &id, to)
}

/// Renumbers one container to follow `ordered_ids` exactly.
///
/// `ordered_ids` must list every entry of the container once.
pub fn reorder_container<T: Positioned>(
    items: &[T],
    container: Option<&str>,
    ordered_ids: &[String],
) -> Result<MovePlan<T>, ReorderError> {
    let current = container_order(items, container);
    if ordered_ids.len() != current.len() {
        return Err(ReorderError::OrderMismatch(format!(
            "expected {} ids, got {}",
            current.len(),
            ordered_ids.len()
        )));
    }

    let mut order = Vec::with_capacity(ordered_ids.len());
    for id in ordered_ids {
        let index = current
            .iter()
            .copied()
            .find(|&i| items[i].id() == id.as_str())
            .ok_or_else(|| ReorderError::OrderMismatch(format!("{} is not in this container", id)))?;
        if order.contains(&index) {
            return Err(ReorderError::OrderMismatch(format!("{} listed twice", id)));
        }
        order.push(index);
    }

    let mut next = items.to_vec();
    let mut changed = Vec::new();
    renumber(&mut next, &order, &mut changed)?;
    Ok(MovePlan { items: next, changed })
}

/// Containers whose positions are not exactly `0..n-1`.
pub fn contiguity_violations<T: Positioned>(items: &[T]) -> Vec<Option<String>> {
    let mut containers: Vec<Option<&str>> = Vec::new();
    for item in items {
        if !containers.contains(&item.container()) {
            containers.push(item.container());
        }
    }

    containers
        .into_iter()
        .filter(|&container| {
            let mut positions: Vec<i32> = items
                .iter()
                .filter(|item| item.container() == container)
                .map(|item| item.position())
                .collect();
            positions.sort_unstable();
            positions.iter().enumerate().any(|(i, &p)| p != i as i32)
        })
        .map(|container| container.map(str::to_string))
        .collect()
}

/// Whether every container holds exactly positions `0..n-1`.
pub fn is_contiguous<T: Positioned>(items: &[T]) -> bool {
    contiguity_violations(items).is_empty()
}
