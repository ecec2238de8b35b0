use crate::types::LabelId;

use super::props::PropertyMap;

/// Capabilities shared by vertex and edge payloads.
///
/// Version lists and indexes are generic over this trait.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Labels carried by the entity. Edges have none.
    fn labels(&self) -> &[LabelId];

    /// Properties of the entity.
    fn properties(&self) -> &PropertyMap;

    /// Mutable properties of the entity.
    fn properties_mut(&mut self) -> &mut PropertyMap;

    /// Returns `true` when `label` is among [`Entity::labels`].
    fn has_label(&self, label: LabelId) -> bool {
        self.labels().contains(&label)
    }
}
