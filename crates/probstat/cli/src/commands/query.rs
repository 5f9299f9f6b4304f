// Probstat
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use super::CommandContext;
use probstat_core::{Dimension, Element};
use serde::Serialize;

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct CountOutput {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct UniqueOutput {
    pub unique_entities: u64,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct TopEntry {
    pub item: String,
    pub count: u64,
}

impl From<Element> for TopEntry {
    fn from(element: Element) -> Self {
        Self {
            item: element.item_str().into_owned(),
            count: element.count,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct TopOutput {
    pub dimension: String,
    pub elements: Vec<TopEntry>,
}

pub fn count(ctx: &CommandContext, key: &str) -> CountOutput {
    CountOutput {
        key: key.to_string(),
        count: ctx.engine().count(key),
    }
}

pub fn unique(ctx: &CommandContext) -> UniqueOutput {
    UniqueOutput {
        unique_entities: ctx.engine().count_unique_entities(),
    }
}

pub fn top(ctx: &CommandContext, dimension: Dimension) -> TopOutput {
    TopOutput {
        dimension: dimension.to_string(),
        elements: ctx.engine().top(dimension).into_iter().map(TopEntry::from).collect(),
    }
}
