// Copyright 2026 Muvon Un Limited
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

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "webrag")]
#[command(version, author = "Muvon Un Limited <opensource@muvon.io>")]
#[command(about = "Crawl a website, chunk and embed its content, and answer questions over it", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl a website starting from a seed URL and index its pages
    Crawl {
        /// Seed URL; crawling stays within this URL prefix
        url: String,

        /// Maximum number of pages to visit in this run
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Retrieve the stored chunks most similar to a question
    Query {
        /// Natural-language question
        question: String,

        /// Number of results to return
        #[arg(short = 'k', long, default_value = "3")]
        limit: usize,
    },

    /// Answer a question using retrieved chunks as context
    Ask {
        /// Natural-language question
        question: String,
    },

    /// List indexed sources with chunk counts
    Sources {
        /// Maximum number of sources to list
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show aggregate index statistics
    Stats,

    /// Remove everything indexed for one source URL
    Forget {
        /// Source URL to remove
        url: String,
    },
}
