//! Instruction templates for the text and vision extraction paths.
//!
//! Both templates describe the same JSON schema; they differ only in what the
//! model is told it is looking at. Any change to the schema wording must bump
//! [`PROMPT_VERSION`], which is logged with every extraction so outputs can be
//! traced back to the template that produced them.

/// Bumped whenever either template changes.
pub const PROMPT_VERSION: u32 = 1;

const SCHEMA_AND_VOCABULARY: &str = r#"Return ONLY a JSON object with exactly this shape:

{
  "allergens": {
    "gluten": true | false | null,
    "egg": true | false | null,
    "crustaceans": true | false | null,
    "fish": true | false | null,
    "peanut": true | false | null,
    "soy": true | false | null,
    "milk": true | false | null,
    "tree_nuts": true | false | null,
    "celery": true | false | null,
    "mustard": true | false | null
  },
  "nutritional_values": {
    "energy": "value with unit" | null,
    "fat": "value with unit" | null,
    "carbohydrate": "value with unit" | null,
    "sugar": "value with unit" | null,
    "protein": "value with unit" | null,
    "sodium": "value with unit" | null
  }
}

Rules:
- true: the label states the allergen is contained (ingredients list, bold
  allergen markings, "contains ..." statements).
- false: the label explicitly states it is absent or the product is free of it.
- null: the label does not say. Do NOT guess.
- "may contain traces of" statements count as true.
- Nutritional values are per 100 g / 100 ml when the table has several
  columns. Keep the number and unit exactly as printed, e.g. "250 kcal",
  "1046 kJ / 250 kcal", "12,5 g".
- Use null for any nutrient the label does not list.
- Do not add keys. Do not wrap the JSON in markdown fences.

Labels may be in English or Hungarian. Hungarian terms:
- gluten: glutén, búza, árpa, rozs, zab
- egg: tojás
- crustaceans: rákfélék
- fish: hal
- peanut: földimogyoró
- soy: szója, szójabab
- milk: tej, tejfehérje, laktóz, tejpor, vaj, sajt
- tree_nuts: diófélék, dió, mogyoró, mandula, kesudió, pisztácia
- celery: zeller
- mustard: mustár
- energy: energia, energiatartalom
- fat: zsír
- carbohydrate: szénhidrát
- sugar: cukor, amelyből cukrok
- protein: fehérje
- sodium: nátrium, só"#;

/// Build the instruction for the text path: template plus the full label text.
///
/// The whole document goes into one request; no chunking.
pub fn text_extraction_prompt(label_text: &str) -> String {
    format!(
        "You are a food-label analyst. The text below was extracted from a \
product label PDF. Identify allergens and nutritional values.\n\n\
{SCHEMA_AND_VOCABULARY}\n\n\
LABEL TEXT:\n\"\"\"\n{label_text}\n\"\"\""
    )
}

/// Instruction block sent ahead of the page images on the vision path.
pub fn vision_extraction_prompt(page_count: usize) -> String {
    format!(
        "You are a food-label analyst. The {page_count} image(s) that follow are \
the pages of one scanned product label, in page order. A nutrition table may \
continue across pages; read all of them before answering. Identify allergens \
and nutritional values.\n\n{SCHEMA_AND_VOCABULARY}"
    )
}
