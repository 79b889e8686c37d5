// Copyright 2025 rmirpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Services bound by `rmirpc serve`.

use rmirpc_common::protocol::error::Result;
use rmirpc_common::protocol::ArgType;
use rmirpc_server::{MethodTable, Registry};

pub const PRICE_CALCULATOR: &str = "PriceCalculator";
pub const CALC: &str = "Calc";

/// `PriceCalculator.calculateSellingPrice(costPrice, discountAmount)`
pub fn price_calculator() -> MethodTable {
    MethodTable::builder()
        .method(
            "calculateSellingPrice",
            vec![ArgType::Number, ArgType::Number],
            |(cost_price, discount_amount): (f64, f64)| {
                let selling_price = cost_price - discount_amount;
                tracing::info!(cost_price, discount_amount, selling_price, "Calculated selling price");
                Ok(selling_price)
            },
        )
        .build()
}

/// `Calc.multiply(a, b)`
pub fn calc() -> MethodTable {
    MethodTable::builder()
        .method(
            "multiply",
            vec![ArgType::Number, ArgType::Number],
            |(a, b): (f64, f64)| Ok(a * b),
        )
        .build()
}

/// Binds every demo service, replacing existing bindings of the same name.
pub fn bind_demo_services(registry: &Registry) -> Result<()> {
    registry.rebind(PRICE_CALCULATOR, price_calculator())?;
    registry.rebind(CALC, calc())?;
    Ok(())
}
