use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    #[serde(rename = "OSM")]
    Osm,
    #[serde(rename = "GOOGLE")]
    Google,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Osm => "OSM",
            SourceKind::Google => "GOOGLE",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TagFilter {
    pub key: &'static str,
    pub values: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub enum CategoryQuery {
    OsmTags(&'static [TagFilter]),
    GoogleNearby(&'static str),
    GoogleText(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct Category {
    pub id: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
    pub radius_m: u32,
    pub max_results: usize,
    pub fetch_details: bool,
    pub query: CategoryQuery,
}

impl Category {
    pub fn source(&self) -> SourceKind {
        match self.query {
            CategoryQuery::OsmTags(_) => SourceKind::Osm,
            CategoryQuery::GoogleNearby(_) | CategoryQuery::GoogleText(_) => SourceKind::Google,
        }
    }
}

pub const CATEGORIES: &[Category] = &[
    Category {
        id: "pharmacy",
        label: "Farmacias",
        icon: "cross",
        radius_m: 1_000,
        max_results: 5,
        fetch_details: true,
        query: CategoryQuery::OsmTags(&[TagFilter {
            key: "amenity",
            values: &["pharmacy"],
        }]),
    },
    Category {
        id: "supermarket",
        label: "Supermercados",
        icon: "shopping-cart",
        radius_m: 800,
        max_results: 5,
        fetch_details: true,
        query: CategoryQuery::OsmTags(&[TagFilter {
            key: "shop",
            values: &["supermarket", "convenience", "greengrocer"],
        }]),
    },
    Category {
        id: "bakery",
        label: "Panaderías",
        icon: "croissant",
        radius_m: 800,
        max_results: 4,
        fetch_details: false,
        query: CategoryQuery::OsmTags(&[TagFilter {
            key: "shop",
            values: &["bakery", "pastry"],
        }]),
    },
    Category {
        id: "atm",
        label: "Cajeros",
        icon: "credit-card",
        radius_m: 800,
        max_results: 4,
        fetch_details: false,
        query: CategoryQuery::OsmTags(&[TagFilter {
            key: "amenity",
            values: &["atm", "bank"],
        }]),
    },
    Category {
        id: "transport",
        label: "Transporte público",
        icon: "bus",
        radius_m: 600,
        max_results: 5,
        fetch_details: false,
        query: CategoryQuery::OsmTags(&[
            TagFilter {
                key: "highway",
                values: &["bus_stop"],
            },
            TagFilter {
                key: "railway",
                values: &["station", "tram_stop"],
            },
        ]),
    },
    Category {
        id: "health",
        label: "Centros de salud",
        icon: "stethoscope",
        radius_m: 1_500,
        max_results: 4,
        fetch_details: false,
        query: CategoryQuery::OsmTags(&[TagFilter {
            key: "amenity",
            values: &["clinic", "hospital", "doctors"],
        }]),
    },
    Category {
        id: "playground",
        label: "Parques infantiles",
        icon: "baby",
        radius_m: 1_000,
        max_results: 4,
        fetch_details: false,
        query: CategoryQuery::OsmTags(&[TagFilter {
            key: "leisure",
            values: &["playground"],
        }]),
    },
    Category {
        id: "restaurant",
        label: "Restaurantes",
        icon: "utensils-crossed",
        radius_m: 1_500,
        max_results: 6,
        fetch_details: true,
        query: CategoryQuery::GoogleText("mejores restaurantes"),
    },
    Category {
        id: "cafe",
        label: "Cafeterías",
        icon: "coffee",
        radius_m: 1_000,
        max_results: 5,
        fetch_details: true,
        query: CategoryQuery::GoogleNearby("cafe"),
    },
    Category {
        id: "attractions",
        label: "Qué ver",
        icon: "landmark",
        radius_m: 3_000,
        max_results: 6,
        fetch_details: true,
        query: CategoryQuery::GoogleText("qué ver atracciones turísticas"),
    },
];

pub fn category_by_id(id: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|category| category.id == id)
}

pub fn select_categories(ids: Option<&[String]>) -> Vec<&'static Category> {
    match ids {
        Some(ids) => CATEGORIES
            .iter()
            .filter(|category| ids.iter().any(|id| id == category.id))
            .collect(),
        None => CATEGORIES.iter().collect(),
    }
}
