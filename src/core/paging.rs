// =============================================================================
// PAGING — Pagination, tris et pages de résultats
// =============================================================================
//
// Une requête paginée décrit :
//   - la page voulue (numérotée depuis 0) et sa taille
//   - une liste ordonnée de tris : (référence de projection, sens)
//
// Le résultat est une Sheet : le contenu de la page, le nombre total
// d'éléments, et le nombre de pages (division arrondie au supérieur).
// Sans taille de page, tout le résultat tient sur une seule « page » et le
// nombre de pages est absent.
//
// =============================================================================

use serde::{Deserialize, Serialize};

/// Sens d'un tri.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn is_ascending(self) -> bool {
        self == Direction::Asc
    }
}

/// Un tri sur une référence de projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorting {
    pub reference: String,
    #[serde(default)]
    pub direction: Direction,
}

/// Pagination et tris d'une recherche.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingAndSorting {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub sortings: Vec<Sorting>,
}

impl PagingAndSorting {
    /// Aucune pagination, aucun tri.
    pub fn unpaged() -> Self {
        Self::default()
    }

    pub fn page(page: usize, page_size: usize) -> Self {
        PagingAndSorting {
            page: Some(page),
            page_size: Some(page_size),
            sortings: Vec::new(),
        }
    }

    pub fn sorted_by(mut self, reference: &str, direction: Direction) -> Self {
        self.sortings.push(Sorting {
            reference: reference.to_string(),
            direction,
        });
        self
    }

    pub fn asc(self, reference: &str) -> Self {
        self.sorted_by(reference, Direction::Asc)
    }

    pub fn desc(self, reference: &str) -> Self {
        self.sorted_by(reference, Direction::Desc)
    }

    /// Premier élément de la page (page absente → 0).
    pub fn offset(&self) -> usize {
        match self.page_size {
            Some(size) => self.page.unwrap_or(0).saturating_mul(size),
            None => 0,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.page_size
    }
}

/// Une page de résultats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet<T> {
    pub content: Vec<T>,
    pub total_elements: usize,
    pub total_pages: Option<usize>,
}

impl<T> Sheet<T> {
    pub fn new(content: Vec<T>, total_elements: usize, page_size: Option<usize>) -> Self {
        Sheet {
            content,
            total_elements,
            total_pages: page_size.map(|size| if size == 0 { 0 } else { total_elements.div_ceil(size) }),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Sheet<U> {
        Sheet {
            content: self.content.into_iter().map(f).collect(),
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset() {
        assert_eq!(PagingAndSorting::page(0, 3).offset(), 0);
        assert_eq!(PagingAndSorting::page(2, 3).offset(), 6);
        assert_eq!(PagingAndSorting::unpaged().offset(), 0);
        assert_eq!(PagingAndSorting::unpaged().limit(), None);
    }

    #[test]
    fn test_offset_saturates_on_huge_page() {
        assert_eq!(PagingAndSorting::page(usize::MAX, 3).offset(), usize::MAX);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(Sheet::new(vec![1, 2, 3], 8, Some(3)).total_pages, Some(3));
        assert_eq!(Sheet::new(vec![1, 2, 3], 9, Some(3)).total_pages, Some(3));
        assert_eq!(Sheet::<i32>::new(vec![], 0, Some(3)).total_pages, Some(0));
        assert_eq!(Sheet::new(vec![1], 1, None).total_pages, None);
    }

    #[test]
    fn test_sortings_keep_order() {
        let paging = PagingAndSorting::page(0, 10).asc("name").desc("uid");
        let refs: Vec<(&str, Direction)> = paging
            .sortings
            .iter()
            .map(|s| (s.reference.as_str(), s.direction))
            .collect();
        assert_eq!(refs, vec![("name", Direction::Asc), ("uid", Direction::Desc)]);
    }

    #[test]
    fn test_deserialize_from_json() {
        let paging: PagingAndSorting = serde_json::from_str(
            r#"{"page": 1, "page_size": 2, "sortings": [{"reference": "name", "direction": "desc"}, {"reference": "uid"}]}"#,
        )
        .expect("pagination");
        assert_eq!(paging.offset(), 2);
        assert_eq!(paging.sortings[0].direction, Direction::Desc);
        assert_eq!(paging.sortings[1].direction, Direction::Asc);
    }
}
