//! Formatting of catalog filter queries (Apicalypse text).
//!
//! Pure text assembly with a fixed field list, a fixed page size, and a
//! rating-descending sort. Filter ids are numeric by construction; the only
//! caller text that reaches the query is the search term.

pub const PAGE_SIZE: u32 = 20;

const SEARCH_FIELDS: &str = "fields id, name, cover.url, genres.name, themes.name, \
     platforms.name, rating, age_ratings.category, game_modes.name, first_release_date;";

const DETAIL_FIELDS: &str = "fields id, name, cover.url, genres.name, themes.name, \
     platforms.name, rating, summary, game_modes.name, age_ratings.category, first_release_date;";

#[derive(Debug, Clone)]
pub struct GameFilters {
    /// Free-text name match.
    pub search: Option<String>,
    /// Catalog genre ids; a game matches when it carries any of them.
    pub genres: Vec<u64>,
    pub themes: Vec<u64>,
    pub platforms: Vec<u64>,
    /// Content-rating category id.
    pub esrb: Option<u64>,
    pub game_modes: Vec<u64>,
    /// 1-based page number.
    pub page: u32,
}

impl Default for GameFilters {
    fn default() -> Self {
        Self {
            search: None,
            genres: Vec::new(),
            themes: Vec::new(),
            platforms: Vec::new(),
            esrb: None,
            game_modes: Vec::new(),
            page: 1,
        }
    }
}

pub fn search_query(filters: &GameFilters) -> String {
    let offset = filters.page.max(1).saturating_sub(1) * PAGE_SIZE;
    let mut query = format!("{SEARCH_FIELDS} limit {PAGE_SIZE}; offset {offset};");

    let mut clauses = Vec::new();

    if let Some(search) = filters.search.as_deref() {
        // Embedded quotes would terminate the quoted term early.
        let term: String = search.chars().filter(|c| *c != '"').collect();
        if !term.is_empty() {
            clauses.push(format!("name ~ *\"{term}\"*"));
        }
    }
    if !filters.genres.is_empty() {
        clauses.push(format!("genres = ({})", join_ids(&filters.genres)));
    }
    if !filters.themes.is_empty() {
        clauses.push(format!("themes = ({})", join_ids(&filters.themes)));
    }
    if !filters.platforms.is_empty() {
        clauses.push(format!("platforms = ({})", join_ids(&filters.platforms)));
    }
    if let Some(esrb) = filters.esrb {
        clauses.push(format!("age_ratings.category = {esrb}"));
    }
    if !filters.game_modes.is_empty() {
        clauses.push(format!("game_modes = ({})", join_ids(&filters.game_modes)));
    }

    if !clauses.is_empty() {
        query.push_str(&format!(" where {};", clauses.join(" & ")));
    }

    query.push_str(" sort rating desc;");
    query
}

pub fn detail_query(id: i64) -> String {
    format!("{DETAIL_FIELDS} where id = {id}; limit 1;")
}

/// Minimal lookup used when labeling posts with a game name.
pub fn name_query(id: i64) -> String {
    format!("fields id, name; where id = {id};")
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filters_have_no_where_clause() {
        let query = search_query(&GameFilters::default());
        assert!(!query.contains("where"));
        assert!(query.contains("limit 20;"));
        assert!(query.contains("offset 0;"));
        assert!(query.ends_with("sort rating desc;"));
    }

    #[test]
    fn clauses_are_joined_with_ampersand() {
        let filters = GameFilters {
            search: Some("resident evil".into()),
            genres: vec![5],
            platforms: vec![6, 48],
            esrb: Some(4),
            game_modes: vec![1],
            ..GameFilters::default()
        };
        let query = search_query(&filters);
        assert!(query.contains(
            "where name ~ *\"resident evil\"* & genres = (5) & platforms = (6,48) \
             & age_ratings.category = 4 & game_modes = (1);"
        ));
    }

    #[test]
    fn page_number_sets_offset() {
        let filters = GameFilters {
            page: 3,
            ..GameFilters::default()
        };
        assert!(search_query(&filters).contains("offset 40;"));

        // Page 0 is treated as the first page.
        let filters = GameFilters {
            page: 0,
            ..GameFilters::default()
        };
        assert!(search_query(&filters).contains("offset 0;"));
    }

    #[test]
    fn search_term_quotes_are_stripped() {
        let filters = GameFilters {
            search: Some("half\" & rating = 0; \"".into()),
            ..GameFilters::default()
        };
        let query = search_query(&filters);
        assert!(query.contains("name ~ *\"half & rating = 0; \"*"));

        // A term that was nothing but quotes produces no clause at all.
        let filters = GameFilters {
            search: Some("\"\"".into()),
            ..GameFilters::default()
        };
        assert!(!search_query(&filters).contains("where"));
    }

    #[test]
    fn detail_query_pins_id_and_limit() {
        let query = detail_query(1942);
        assert!(query.contains("where id = 1942;"));
        assert!(query.ends_with("limit 1;"));
        assert!(query.contains("summary"));
    }

    #[test]
    fn name_query_is_minimal() {
        assert_eq!(name_query(7), "fields id, name; where id = 7;");
    }
}
