//! What a client is sent before it may enter the world.
//!
//! Registry data, tags, feature flags and the data packs the server
//! shares with the client. [`JoinContent`] is the seam: the default
//! [`VanillaContent`] describes the smallest world a vanilla client will
//! load, and embedders with real world data plug in their own.

use cobble_protocol::packets::common::{
    KnownPack, RegistryData, RegistryEntry, RegistryTags, UpdateTags,
};
use cobble_protocol::{Compound, EncodeError, Ident, List, ProtocolVersion, Str, Tag};

/// Supplies the configuration-stage content of a join.
pub trait JoinContent: Send + Sync + 'static {
    /// Feature flags to enable. `minecraft:vanilla` at the least.
    fn features(&self) -> Vec<Ident>;

    /// Packs the server offers to share with 766 clients.
    fn known_packs(&self) -> Vec<KnownPack>;

    /// Registry packets for `version`, in sending order.
    fn registry_data(&self, version: ProtocolVersion) -> Result<Vec<RegistryData>, EncodeError>;

    fn tags(&self, version: ProtocolVersion) -> UpdateTags;

    /// Registry index of a dimension type, for versions that refer to it
    /// by number.
    fn dimension_type_index(&self, name: &Ident) -> Option<i32>;
}

/// Version of the `minecraft:core` pack 766 clients ship with.
pub const CORE_PACK_VERSION: &str = "1.20.5";

struct Dimension {
    name: &'static str,
    has_skylight: bool,
    has_ceiling: bool,
    ultrawarm: bool,
    natural: bool,
    ambient_light: f32,
    min_y: i32,
    height: i32,
    effects: &'static str,
    infiniburn: &'static str,
}

const DIMENSION_TYPES: &[Dimension] = &[
    Dimension {
        name: "overworld",
        has_skylight: true,
        has_ceiling: false,
        ultrawarm: false,
        natural: true,
        ambient_light: 0.0,
        min_y: -64,
        height: 384,
        effects: "minecraft:overworld",
        infiniburn: "#minecraft:infiniburn_overworld",
    },
    Dimension {
        name: "overworld_caves",
        has_skylight: true,
        has_ceiling: true,
        ultrawarm: false,
        natural: true,
        ambient_light: 0.0,
        min_y: -64,
        height: 384,
        effects: "minecraft:overworld",
        infiniburn: "#minecraft:infiniburn_overworld",
    },
    Dimension {
        name: "the_end",
        has_skylight: false,
        has_ceiling: false,
        ultrawarm: false,
        natural: false,
        ambient_light: 0.0,
        min_y: 0,
        height: 256,
        effects: "minecraft:the_end",
        infiniburn: "#minecraft:infiniburn_end",
    },
    Dimension {
        name: "the_nether",
        has_skylight: false,
        has_ceiling: true,
        ultrawarm: true,
        natural: false,
        ambient_light: 0.1,
        min_y: 0,
        height: 256,
        effects: "minecraft:the_nether",
        infiniburn: "#minecraft:infiniburn_nether",
    },
];

const BIOMES: &[&str] = &["plains"];

/// Chat types with their chat and narration translation keys.
const CHAT_TYPES: &[(&str, &str, &str)] = &[
    ("chat", "chat.type.text", "chat.type.text.narrate"),
    ("emote_command", "chat.type.emote", "chat.type.emote"),
    (
        "msg_command_incoming",
        "commands.message.display.incoming",
        "chat.type.text.narrate",
    ),
    (
        "msg_command_outgoing",
        "commands.message.display.outgoing",
        "chat.type.text.narrate",
    ),
    ("say_command", "chat.type.announcement", "chat.type.text.narrate"),
    (
        "team_msg_command_incoming",
        "chat.type.team.text",
        "chat.type.text.narrate",
    ),
    (
        "team_msg_command_outgoing",
        "chat.type.team.sent",
        "chat.type.text.narrate",
    ),
];

const DAMAGE_TYPES: &[&str] = &[
    "arrow",
    "bad_respawn_point",
    "cactus",
    "cramming",
    "dragon_breath",
    "drown",
    "dry_out",
    "explosion",
    "fall",
    "falling_anvil",
    "falling_block",
    "falling_stalactite",
    "fireball",
    "fireworks",
    "fly_into_wall",
    "freeze",
    "generic",
    "generic_kill",
    "hot_floor",
    "in_fire",
    "in_wall",
    "indirect_magic",
    "lava",
    "lightning_bolt",
    "magic",
    "mob_attack",
    "mob_attack_no_aggro",
    "mob_projectile",
    "on_fire",
    "out_of_world",
    "outside_border",
    "player_attack",
    "player_explosion",
    "sonic_boom",
    "spit",
    "stalagmite",
    "starve",
    "sting",
    "sweet_berry_bush",
    "thorns",
    "thrown",
    "trident",
    "unattributed_fireball",
    "wither",
    "wither_skull",
];

const WOLF_VARIANTS: &[&str] = &[
    "ashen", "black", "chestnut", "pale", "rusty", "snowy", "spotted", "striped", "woods",
];

const PAINTING_VARIANTS: &[&str] = &[
    "alban",
    "aztec",
    "aztec2",
    "bomb",
    "burning_skull",
    "bust",
    "courbet",
    "creebet",
    "donkey_kong",
    "earth",
    "fighters",
    "fire",
    "graham",
    "kebab",
    "match",
    "pigscene",
    "plant",
    "pointer",
    "pool",
    "sea",
    "skeleton",
    "skull_and_roses",
    "stage",
    "sunset",
    "void",
    "wanderer",
    "wasteland",
    "water",
    "wind",
    "wither",
];

const TRIM_MATERIALS: &[&str] = &[
    "amethyst",
    "copper",
    "diamond",
    "emerald",
    "gold",
    "iron",
    "lapis",
    "netherite",
    "quartz",
    "redstone",
];

const TRIM_PATTERNS: &[&str] = &[
    "coast",
    "dune",
    "eye",
    "host",
    "raiser",
    "rib",
    "sentry",
    "shaper",
    "silence",
    "snout",
    "spire",
    "tide",
    "vex",
    "ward",
    "wayfinder",
    "wild",
];

const BANNER_PATTERNS: &[&str] = &[
    "base",
    "border",
    "bricks",
    "circle",
    "creeper",
    "cross",
    "curly_border",
    "diagonal_left",
    "diagonal_right",
    "diagonal_up_left",
    "diagonal_up_right",
    "flower",
    "globe",
    "gradient",
    "gradient_up",
    "half_horizontal",
    "half_horizontal_bottom",
    "half_vertical",
    "half_vertical_right",
    "mojang",
    "piglin",
    "rhombus",
    "skull",
    "small_stripes",
    "square_bottom_left",
    "square_bottom_right",
    "square_top_left",
    "square_top_right",
    "straight_cross",
    "stripe_bottom",
    "stripe_center",
    "stripe_downleft",
    "stripe_downright",
    "stripe_left",
    "stripe_middle",
    "stripe_right",
    "stripe_top",
    "triangle_bottom",
    "triangle_top",
    "triangles_bottom",
    "triangles_top",
];

/// The smallest registry set a vanilla client accepts.
///
/// For 765 every entry carries data, since that version has no way to
/// share packs. For 766 the entries refer to the client's own
/// `minecraft:core` pack and travel without data.
#[derive(Debug, Clone, Copy, Default)]
pub struct VanillaContent;

impl VanillaContent {
    fn registries() -> Vec<(&'static str, Vec<&'static str>)> {
        vec![
            (
                "dimension_type",
                DIMENSION_TYPES.iter().map(|d| d.name).collect(),
            ),
            ("worldgen/biome", BIOMES.to_vec()),
            ("chat_type", CHAT_TYPES.iter().map(|c| c.0).collect()),
            ("damage_type", DAMAGE_TYPES.to_vec()),
            ("trim_material", TRIM_MATERIALS.to_vec()),
            ("trim_pattern", TRIM_PATTERNS.to_vec()),
            ("wolf_variant", WOLF_VARIANTS.to_vec()),
            ("painting_variant", PAINTING_VARIANTS.to_vec()),
            ("banner_pattern", BANNER_PATTERNS.to_vec()),
        ]
    }

    fn combined() -> Result<Tag, EncodeError> {
        let mut root = Compound::new();
        root.insert(
            "minecraft:dimension_type",
            registry_tag(
                "minecraft:dimension_type",
                DIMENSION_TYPES.iter().map(|d| (d.name, dimension_element(d))),
            )?,
        );
        root.insert(
            "minecraft:worldgen/biome",
            registry_tag(
                "minecraft:worldgen/biome",
                BIOMES.iter().map(|b| (*b, biome_element())),
            )?,
        );
        let chat_types = CHAT_TYPES
            .iter()
            .map(|(name, chat, narration)| Ok((*name, chat_type_element(chat, narration)?)))
            .collect::<Result<Vec<_>, EncodeError>>()?;
        root.insert(
            "minecraft:chat_type",
            registry_tag("minecraft:chat_type", chat_types)?,
        );
        root.insert(
            "minecraft:damage_type",
            registry_tag(
                "minecraft:damage_type",
                DAMAGE_TYPES.iter().map(|d| (*d, damage_type_element(d))),
            )?,
        );
        // Armor trims are synced but may be empty.
        root.insert(
            "minecraft:trim_material",
            registry_tag("minecraft:trim_material", std::iter::empty())?,
        );
        root.insert(
            "minecraft:trim_pattern",
            registry_tag("minecraft:trim_pattern", std::iter::empty())?,
        );
        Ok(Tag::Compound(root))
    }
}

impl JoinContent for VanillaContent {
    fn features(&self) -> Vec<Ident> {
        Ident::vanilla("vanilla").into_iter().collect()
    }

    fn known_packs(&self) -> Vec<KnownPack> {
        vec![KnownPack {
            namespace: Str::from("minecraft"),
            id: Str::from("core"),
            version: Str::from(CORE_PACK_VERSION),
        }]
    }

    fn registry_data(&self, version: ProtocolVersion) -> Result<Vec<RegistryData>, EncodeError> {
        if !version.has_cookies() {
            return Ok(vec![RegistryData::Combined(Self::combined()?)]);
        }
        Self::registries()
            .into_iter()
            .map(|(registry, entries)| {
                let entries = entries
                    .into_iter()
                    .map(|id| Ok(RegistryEntry { id: vanilla(id)?, data: None }))
                    .collect::<Result<Vec<_>, EncodeError>>()?;
                Ok(RegistryData::Single {
                    registry: vanilla(registry)?,
                    entries,
                })
            })
            .collect()
    }

    fn tags(&self, _version: ProtocolVersion) -> UpdateTags {
        UpdateTags {
            registries: Vec::<RegistryTags>::new(),
        }
    }

    fn dimension_type_index(&self, name: &Ident) -> Option<i32> {
        if name.namespace() != Ident::DEFAULT_NAMESPACE {
            return None;
        }
        DIMENSION_TYPES
            .iter()
            .position(|d| d.name == name.path())
            .and_then(|i| i32::try_from(i).ok())
    }
}

fn vanilla(path: &str) -> Result<Ident, EncodeError> {
    Ident::vanilla(path).map_err(|e| EncodeError::OutOfRange {
        ty: "registry id",
        detail: e.to_string(),
    })
}

fn registry_tag<'a>(
    registry: &str,
    elements: impl IntoIterator<Item = (&'a str, Compound)>,
) -> Result<Compound, EncodeError> {
    let values: Vec<Tag> = elements
        .into_iter()
        .enumerate()
        .map(|(id, (name, element))| {
            let id = i32::try_from(id).unwrap_or(i32::MAX);
            Tag::Compound(
                Compound::new()
                    .with("name", format!("minecraft:{name}"))
                    .with("id", id)
                    .with("element", element),
            )
        })
        .collect();
    Ok(Compound::new()
        .with("type", registry)
        .with("value", List::new(values)?))
}

fn dimension_element(d: &Dimension) -> Compound {
    Compound::new()
        .with("piglin_safe", d.ultrawarm)
        .with("natural", d.natural)
        .with("ambient_light", Tag::Float(d.ambient_light))
        .with("monster_spawn_block_light_limit", 0)
        .with("infiniburn", d.infiniburn)
        .with("respawn_anchor_works", d.ultrawarm)
        .with("has_skylight", d.has_skylight)
        .with("bed_works", d.natural)
        .with("effects", d.effects)
        .with("has_raids", d.natural)
        .with("logical_height", d.height)
        .with("coordinate_scale", Tag::Double(if d.ultrawarm { 8.0 } else { 1.0 }))
        .with("monster_spawn_light_level", 0)
        .with("min_y", d.min_y)
        .with("ultrawarm", d.ultrawarm)
        .with("has_ceiling", d.has_ceiling)
        .with("height", d.height)
}

fn biome_element() -> Compound {
    let effects = Compound::new()
        .with("sky_color", 7_907_327)
        .with("water_fog_color", 329_011)
        .with("fog_color", 12_638_463)
        .with("water_color", 4_159_204);
    Compound::new()
        .with("has_precipitation", true)
        .with("temperature", Tag::Float(0.8))
        .with("downfall", Tag::Float(0.4))
        .with("effects", effects)
}

fn chat_type_element(chat: &str, narration: &str) -> Result<Compound, EncodeError> {
    let decoration = |key: &str| -> Result<Compound, EncodeError> {
        let parameters = List::new(vec![Tag::from("sender"), Tag::from("content")])?;
        Ok(Compound::new()
            .with("translation_key", key)
            .with("parameters", parameters))
    };
    Ok(Compound::new()
        .with("chat", decoration(chat)?)
        .with("narration", decoration(narration)?))
}

fn damage_type_element(name: &str) -> Compound {
    Compound::new()
        .with("message_id", name)
        .with("scaling", "when_caused_by_living_non_player")
        .with("exhaustion", Tag::Float(0.1))
}
