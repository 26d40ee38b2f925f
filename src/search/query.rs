use super::BiologicalProfile;
use crate::experiment::RequestStatus;
use crate::predicate::{flag_matches, overlaps_any, text_contains};
use serde::{Deserialize, Serialize};

/// Partial predicate over a sample spec.
///
/// Every set field must match:
/// - text fields: case-insensitive substring
/// - list fields: at least one element in common (case-insensitive)
/// - flags and `status`: exact
///
/// Unset fields (and empty lists) match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiologicalQuery {
    /// Cell line substring
    pub cell_line: Option<String>,
    /// Organism substring
    pub organism: Option<String>,
    /// Tissue type substring
    pub tissue_type: Option<String>,
    /// Nuclear stain substring
    pub nuclear_stain: Option<String>,
    /// Imaging microscope type substring
    pub microscope_type: Option<String>,
    /// Any of these genetic modifications
    pub genetic_modifications: Option<Vec<String>>,
    /// Any of these fluorescent proteins
    pub fluorescent_proteins: Option<Vec<String>>,
    /// Any of these primary antibody targets
    pub antibody_targets: Option<Vec<String>>,
    /// Any of these fluorophores (secondary antibodies or fluorescent proteins)
    pub fluorophores: Option<Vec<String>>,
    /// Any of these compounds
    pub compound_names: Option<Vec<String>>,
    /// Live-cell flag
    pub live_cell: Option<bool>,
    /// Z-stack flag
    pub has_z_stack: Option<bool>,
    /// Time-lapse flag
    pub has_time_lapse: Option<bool>,
    /// Request status
    pub status: Option<RequestStatus>,
}

impl BiologicalQuery {
    /// Query matching every request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Match on cell line.
    #[must_use]
    pub fn cell_line(mut self, cell_line: impl Into<String>) -> Self {
        self.cell_line = Some(cell_line.into());
        self
    }

    /// Match on organism.
    #[must_use]
    pub fn organism(mut self, organism: impl Into<String>) -> Self {
        self.organism = Some(organism.into());
        self
    }

    /// Match any of these fluorescent proteins.
    #[must_use]
    pub fn fluorescent_proteins<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.fluorescent_proteins = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Match any of these compounds.
    #[must_use]
    pub fn compound_names<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.compound_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Match on the live-cell flag.
    #[must_use]
    pub const fn live_cell(mut self, live_cell: bool) -> Self {
        self.live_cell = Some(live_cell);
        self
    }

    /// Match on request status.
    #[must_use]
    pub const fn status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Evaluate against a request's profile and status.
    #[must_use]
    pub fn matches(&self, profile: &BiologicalProfile, status: RequestStatus) -> bool {
        let texts = [
            (&self.cell_line, &profile.cell_line),
            (&self.organism, &profile.organism),
            (&self.tissue_type, &profile.tissue_type),
            (&self.nuclear_stain, &profile.nuclear_stain),
            (&self.microscope_type, &profile.microscope_type),
        ];
        let lists = [
            (&self.genetic_modifications, &profile.genetic_modifications),
            (&self.fluorescent_proteins, &profile.fluorescent_proteins),
            (&self.antibody_targets, &profile.antibody_targets),
            (&self.fluorophores, &profile.fluorophores),
            (&self.compound_names, &profile.compound_names),
        ];

        texts
            .iter()
            .all(|(q, t)| text_contains(q.as_deref(), t.as_deref()))
            && lists
                .iter()
                .all(|(q, t)| overlaps_any(q.as_deref(), t.as_slice()))
            && flag_matches(self.live_cell, profile.live_cell)
            && flag_matches(self.has_z_stack, profile.has_z_stack)
            && flag_matches(self.has_time_lapse, profile.has_time_lapse)
            && self.status.map_or(true, |s| s == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::SampleSpec;

    fn hela(live: bool) -> BiologicalProfile {
        let mut spec = SampleSpec::new("s1");
        spec.biological_context.cell_line = Some("HeLa".into());
        spec.imaging_parameters.live_cell = Some(live);
        BiologicalProfile::from_spec(&spec)
    }

    #[test]
    fn test_empty_query_matches() {
        assert!(BiologicalQuery::new().matches(&hela(false), RequestStatus::Submitted));
    }

    #[test]
    fn test_substring_is_case_insensitive() {
        let q = BiologicalQuery::new().cell_line("hela");
        assert!(q.matches(&hela(false), RequestStatus::Submitted));
        let q = BiologicalQuery::new().cell_line("ELA");
        assert!(q.matches(&hela(false), RequestStatus::Submitted));
        let q = BiologicalQuery::new().cell_line("MCF7");
        assert!(!q.matches(&hela(false), RequestStatus::Submitted));
    }

    #[test]
    fn test_flags_are_exact() {
        let q = BiologicalQuery::new().cell_line("HeLa").live_cell(true);
        assert!(q.matches(&hela(true), RequestStatus::Submitted));
        assert!(!q.matches(&hela(false), RequestStatus::Submitted));
    }

    #[test]
    fn test_list_needs_overlap_unless_empty() {
        let q = BiologicalQuery::new().fluorescent_proteins(["GFP"]);
        assert!(!q.matches(&hela(false), RequestStatus::Submitted));

        let q = BiologicalQuery::new().fluorescent_proteins(Vec::<String>::new());
        assert!(q.matches(&hela(false), RequestStatus::Submitted));
    }

    #[test]
    fn test_status_filter() {
        let q = BiologicalQuery::new().status(RequestStatus::Approved);
        assert!(!q.matches(&hela(false), RequestStatus::Submitted));
        assert!(q.matches(&hela(false), RequestStatus::Approved));
    }
}
