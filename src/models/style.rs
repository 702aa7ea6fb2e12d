use serde::Serialize;

/// A transformation style offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Style {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

const CATALOG: &[Style] = &[
    Style {
        id: "vangogh",
        name: "Van Gogh",
        description: "Post-impressionist style with bold colors and expressive brushstrokes",
    },
    Style {
        id: "monet",
        name: "Monet",
        description: "Impressionist style with soft, dreamlike qualities",
    },
    Style {
        id: "anime",
        name: "Anime",
        description: "Japanese animation style with vibrant colors",
    },
    Style {
        id: "pixar",
        name: "Pixar",
        description: "3D animated style with clean, polished look",
    },
    Style {
        id: "watercolor",
        name: "Watercolor",
        description: "Soft, flowing watercolor painting style",
    },
];

pub fn catalog() -> &'static [Style] {
    CATALOG
}

pub fn find(id: &str) -> Option<&'static Style> {
    CATALOG.iter().find(|style| style.id == id)
}
