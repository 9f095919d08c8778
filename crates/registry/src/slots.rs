//! The built-in domain table. Adding a vertical means adding one entry here
//! plus a search-backend binding at wiring time.

use crate::{Domain, DomainSpec, PriceScale, Slot, SlotKind, SlotPriority};

fn categorical(values: &[&str]) -> SlotKind {
    SlotKind::Categorical {
        allowed: values.iter().map(|value| value.to_string()).collect(),
    }
}

fn replies(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[allow(clippy::too_many_arguments)]
fn slot(
    key: &str,
    priority: SlotPriority,
    kind: SlotKind,
    example_prompt: &str,
    example_replies: &[&str],
    required_for_search: bool,
) -> Slot {
    Slot {
        key: key.to_string(),
        priority,
        kind,
        example_prompt: example_prompt.to_string(),
        example_replies: replies(example_replies),
        required_for_search,
    }
}

pub fn builtin_domains() -> Vec<DomainSpec> {
    vec![vehicles(), laptops(), books()]
}

fn vehicles() -> DomainSpec {
    DomainSpec {
        domain: Domain::Vehicles,
        keywords: replies(&["vehicle", "vehicles", "car", "cars", "truck", "suv", "sedan"]),
        slots: vec![
            slot(
                "budget",
                SlotPriority::High,
                SlotKind::PriceRange { scale: PriceScale::Thousands },
                "What budget do you have in mind for the vehicle, or feel free to share anything else you care about?",
                &["Under $20k", "$20k-$35k", "$35k-$50k", "No real limit"],
                true,
            ),
            slot(
                "body_style",
                SlotPriority::High,
                categorical(&["sedan", "suv", "truck", "coupe", "hatchback", "minivan"]),
                "What kind of vehicle fits your life best, or feel free to share anything else you care about?",
                &["SUV", "Sedan", "Truck", "Not sure yet"],
                true,
            ),
            slot(
                "make",
                SlotPriority::Medium,
                categorical(&["Toyota", "Honda", "Ford", "Chevrolet", "BMW", "Tesla", "Subaru"]),
                "Any makes you gravitate toward, or feel free to share anything else you care about?",
                &["Toyota", "Honda", "Ford", "No preference"],
                false,
            ),
            slot(
                "fuel_type",
                SlotPriority::Low,
                categorical(&["gas", "hybrid", "electric", "diesel"]),
                "Gas, hybrid, or electric, or feel free to share anything else you care about?",
                &["Gas", "Hybrid", "Electric"],
                false,
            ),
            slot(
                "color",
                SlotPriority::Low,
                categorical(&["black", "white", "silver", "blue", "red", "gray"]),
                "Any color preference, or feel free to share anything else you care about?",
                &["Black", "White", "Surprise me"],
                false,
            ),
        ],
    }
}

fn laptops() -> DomainSpec {
    DomainSpec {
        domain: Domain::Laptops,
        keywords: replies(&["laptop", "laptops", "computer", "notebook", "ultrabook", "macbook"]),
        slots: vec![
            slot(
                "budget",
                SlotPriority::High,
                SlotKind::PriceRange { scale: PriceScale::Dollars },
                "What's your budget for the laptop, or feel free to share anything else you care about?",
                &["Under $800", "$800-$1,500", "$1,500-$2,500", "Sky's the limit"],
                true,
            ),
            slot(
                "use_case",
                SlotPriority::High,
                categorical(&["gaming", "work", "school", "creative", "general"]),
                "What will you mostly use it for, or feel free to share anything else you care about?",
                &["Gaming", "Work", "School", "Creative work"],
                true,
            ),
            slot(
                "brand",
                SlotPriority::Medium,
                categorical(&["Dell", "Lenovo", "HP", "Apple", "Asus", "Acer"]),
                "Any brands you trust or avoid, or feel free to share anything else you care about?",
                &["Dell", "Lenovo", "Apple", "No preference"],
                true,
            ),
            slot(
                "gpu_vendor",
                SlotPriority::Medium,
                categorical(&["NVIDIA", "AMD", "Intel"]),
                "Do you need a particular graphics vendor, or feel free to share anything else you care about?",
                &["NVIDIA", "AMD", "Whatever works"],
                true,
            ),
            slot(
                "ram_gb",
                SlotPriority::Low,
                SlotKind::Integer,
                "How much memory do you want, in GB, or feel free to share anything else you care about?",
                &["16", "32", "Not sure"],
                false,
            ),
            slot(
                "screen_size",
                SlotPriority::Low,
                categorical(&["13", "14", "15", "16", "17"]),
                "What screen size suits you, in inches, or feel free to share anything else you care about?",
                &["14", "15", "16"],
                false,
            ),
        ],
    }
}

fn books() -> DomainSpec {
    DomainSpec {
        domain: Domain::Books,
        keywords: replies(&["book", "books", "novel", "novels", "paperback", "audiobook"]),
        slots: vec![
            slot(
                "genre",
                SlotPriority::High,
                categorical(&[
                    "mystery", "sci-fi", "fantasy", "romance", "thriller", "biography",
                    "history", "self-help",
                ]),
                "What genre are you in the mood for, or feel free to share anything else you care about?",
                &["Mystery", "Sci-fi", "Fantasy", "Surprise me"],
                true,
            ),
            slot(
                "budget",
                SlotPriority::High,
                SlotKind::PriceRange { scale: PriceScale::Dollars },
                "Roughly how much would you like to spend, or feel free to share anything else you care about?",
                &["Under $15", "Under $30", "Doesn't matter"],
                true,
            ),
            slot(
                "format",
                SlotPriority::Medium,
                categorical(&["paperback", "hardcover", "ebook", "audiobook"]),
                "Paper, ebook, or audio, or feel free to share anything else you care about?",
                &["Paperback", "Ebook", "Audiobook"],
                false,
            ),
            slot(
                "length",
                SlotPriority::Low,
                categorical(&["short", "medium", "long"]),
                "Do you prefer a quick read or a long one, or feel free to share anything else you care about?",
                &["Short", "Medium", "Long"],
                false,
            ),
        ],
    }
}
