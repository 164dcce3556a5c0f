// src/report.rs
//
// Table rendering shared by both front-ends; keeps all presentation
// out of the pipeline itself.

use crate::apportion::LineItem;
use crate::pipeline::PipelineState;
use crate::settlement::Settlement;

pub fn print_items(items: &[LineItem]) {
    println!("\n--- Products ---");
    println!(
        "{:<32} {:>4} {:>10} {:>8} {:>12}",
        "Product", "Qty", "Price", "Tax", "Incl. Tax"
    );
    for item in items {
        println!(
            "{:<32} {:>4} {:>10.2} {:>8.2} {:>12.2}",
            item.name, item.quantity, item.unit_price, item.tax_amount, item.price_incl_tax
        );
    }
}

pub fn print_assignments(state: &PipelineState) {
    let mut any = false;
    println!("\n--- Price Splitting Summary ---");
    for assignment in state.assignments() {
        let Ok(share) = assignment.share() else {
            continue;
        };
        let names: Vec<&str> = assignment.participants.iter().map(String::as_str).collect();
        println!(
            "{:<32} {:>10.2} each  ({})",
            assignment.item,
            share,
            names.join(", ")
        );
        any = true;
    }
    if !any {
        println!("(no items assigned yet)");
    }
}

pub fn print_settlement(payer: &str, settlement: &Settlement) {
    println!("\n--- Who Owes How Much to Whom? ---");
    let mut any = false;
    for (name, amount) in settlement.debts() {
        println!("{name} owes {payer} ${amount:.2}");
        any = true;
    }
    if !any {
        println!("Nobody owes {payer} anything.");
    }
    println!("{payer} spent ${:.2} on themselves.", settlement.self_spend);
}
