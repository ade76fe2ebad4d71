// Copyright 2025 Relcore Contributors
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

//! Identifiers of the built-in catalog objects
//!
//! The numbering is stable: test fixtures and serialized operator specs
//! refer to these values directly.

use crate::core::Oid;

// ============================================================================
// Operators
// ============================================================================

pub const INT8_EQ_OP: Oid = 410;
pub const INT8_NE_OP: Oid = 411;
pub const INT8_LT_OP: Oid = 412;
pub const INT8_GT_OP: Oid = 413;
pub const INT8_LE_OP: Oid = 414;
pub const INT8_GE_OP: Oid = 415;
pub const INT8_PLUS_OP: Oid = 684;
pub const INT8_MINUS_OP: Oid = 685;
pub const INT8_MUL_OP: Oid = 686;
pub const INT8_DIV_OP: Oid = 687;

pub const FLOAT8_EQ_OP: Oid = 670;
pub const FLOAT8_NE_OP: Oid = 671;
pub const FLOAT8_LT_OP: Oid = 672;
pub const FLOAT8_LE_OP: Oid = 673;
pub const FLOAT8_GT_OP: Oid = 674;
pub const FLOAT8_GE_OP: Oid = 675;
pub const FLOAT8_PLUS_OP: Oid = 591;
pub const FLOAT8_MINUS_OP: Oid = 592;
pub const FLOAT8_DIV_OP: Oid = 593;
pub const FLOAT8_MUL_OP: Oid = 594;

pub const TEXT_EQ_OP: Oid = 98;
pub const TEXT_NE_OP: Oid = 531;
pub const TEXT_LT_OP: Oid = 664;
pub const TEXT_LE_OP: Oid = 665;
pub const TEXT_GT_OP: Oid = 666;
pub const TEXT_GE_OP: Oid = 667;
pub const TEXT_CONCAT_OP: Oid = 654;

pub const BOOL_EQ_OP: Oid = 91;
pub const TID_EQ_OP: Oid = 387;

pub const TIMESTAMP_EQ_OP: Oid = 2060;
pub const TIMESTAMP_NE_OP: Oid = 2061;
pub const TIMESTAMP_LT_OP: Oid = 2062;
pub const TIMESTAMP_LE_OP: Oid = 2063;
pub const TIMESTAMP_GT_OP: Oid = 2064;
pub const TIMESTAMP_GE_OP: Oid = 2065;

// ============================================================================
// Operator implementation functions
// ============================================================================

pub const F_BOOLEQ: Oid = 60;
pub const F_TEXTEQ: Oid = 67;
pub const F_TEXTNE: Oid = 157;
pub const F_FLOAT8MUL: Oid = 216;
pub const F_FLOAT8DIV: Oid = 217;
pub const F_FLOAT8PL: Oid = 218;
pub const F_FLOAT8MI: Oid = 219;
pub const F_FLOAT8EQ: Oid = 293;
pub const F_FLOAT8NE: Oid = 294;
pub const F_FLOAT8LT: Oid = 295;
pub const F_FLOAT8LE: Oid = 296;
pub const F_FLOAT8GT: Oid = 297;
pub const F_FLOAT8GE: Oid = 298;
pub const F_INT8PL: Oid = 463;
pub const F_INT8MI: Oid = 464;
pub const F_INT8MUL: Oid = 465;
pub const F_INT8DIV: Oid = 466;
pub const F_INT8EQ: Oid = 467;
pub const F_INT8NE: Oid = 468;
pub const F_INT8LT: Oid = 469;
pub const F_INT8GT: Oid = 470;
pub const F_INT8LE: Oid = 471;
pub const F_INT8GE: Oid = 472;
pub const F_TEXT_LT: Oid = 740;
pub const F_TEXT_LE: Oid = 741;
pub const F_TEXT_GT: Oid = 742;
pub const F_TEXT_GE: Oid = 743;
pub const F_TEXTCAT: Oid = 1258;
pub const F_TIDEQ: Oid = 1292;
pub const F_TIMESTAMP_EQ: Oid = 2052;
pub const F_TIMESTAMP_NE: Oid = 2053;
pub const F_TIMESTAMP_LT: Oid = 2054;
pub const F_TIMESTAMP_LE: Oid = 2055;
pub const F_TIMESTAMP_GE: Oid = 2056;
pub const F_TIMESTAMP_GT: Oid = 2057;

// ============================================================================
// In-range support functions (RANGE frames with an offset)
// ============================================================================

pub const F_IN_RANGE_INT8: Oid = 4126;
pub const F_IN_RANGE_TIMESTAMP: Oid = 4134;
pub const F_IN_RANGE_FLOAT8: Oid = 4139;

// ============================================================================
// Aggregate support functions
// ============================================================================

pub const F_INT8_SUM_ACCUM: Oid = 6000;
pub const F_INT8_SUM_INV: Oid = 6001;
pub const F_FLOAT8_SUM_ACCUM: Oid = 6002;
pub const F_FLOAT8_SUM_INV: Oid = 6003;
pub const F_INT8INC_ANY: Oid = 6004;
pub const F_INT8DEC_ANY: Oid = 6005;
pub const F_INT8INC: Oid = 6006;
pub const F_INT8DEC: Oid = 6007;
pub const F_INT8_AVG_ACCUM: Oid = 6008;
pub const F_INT8_AVG_INV: Oid = 6009;
pub const F_FLOAT8_AVG_ACCUM: Oid = 6010;
pub const F_FLOAT8_AVG_INV: Oid = 6011;
pub const F_AVG_FINAL: Oid = 6012;
pub const F_VALUE_LARGER: Oid = 6013;
pub const F_VALUE_SMALLER: Oid = 6014;
pub const F_BOOLAND_STATEFUNC: Oid = 6015;
pub const F_BOOLOR_STATEFUNC: Oid = 6016;
pub const F_STRING_AGG_TRANSFN: Oid = 6017;

// ============================================================================
// Aggregates
// ============================================================================

pub const AGG_AVG_INT8: Oid = 2100;
pub const AGG_AVG_FLOAT8: Oid = 2105;
pub const AGG_SUM_INT8: Oid = 2107;
pub const AGG_SUM_FLOAT8: Oid = 2111;
pub const AGG_MAX_FLOAT8: Oid = 2120;
pub const AGG_MAX_TEXT: Oid = 2129;
pub const AGG_MAX_INT8: Oid = 2131;
pub const AGG_MIN_INT8: Oid = 2135;
pub const AGG_MIN_FLOAT8: Oid = 2136;
pub const AGG_MIN_TEXT: Oid = 2145;
pub const AGG_COUNT_ANY: Oid = 2147;
pub const AGG_BOOL_AND: Oid = 2517;
pub const AGG_BOOL_OR: Oid = 2518;
pub const AGG_COUNT_STAR: Oid = 2803;
pub const AGG_STRING_AGG: Oid = 3538;

// ============================================================================
// Window functions
// ============================================================================

pub const WIN_ROW_NUMBER: Oid = 3100;
pub const WIN_RANK: Oid = 3101;
pub const WIN_DENSE_RANK: Oid = 3102;
pub const WIN_PERCENT_RANK: Oid = 3103;
pub const WIN_CUME_DIST: Oid = 3104;
pub const WIN_NTILE: Oid = 3105;
pub const WIN_LAG: Oid = 3106;
pub const WIN_LAG_OFFSET: Oid = 3107;
pub const WIN_LAG_OFFSET_DEFAULT: Oid = 3108;
pub const WIN_LEAD: Oid = 3109;
pub const WIN_LEAD_OFFSET: Oid = 3110;
pub const WIN_LEAD_OFFSET_DEFAULT: Oid = 3111;
pub const WIN_FIRST_VALUE: Oid = 3112;
pub const WIN_LAST_VALUE: Oid = 3113;
pub const WIN_NTH_VALUE: Oid = 3114;

// ============================================================================
// Operator classes
// ============================================================================

pub const INT8_BTREE_OPS: Oid = 3124;
pub const FLOAT8_BTREE_OPS: Oid = 1970;
pub const TEXT_BTREE_OPS: Oid = 1994;
pub const TIMESTAMP_BTREE_OPS: Oid = 434;
pub const INT8_HASH_OPS: Oid = 1979;
pub const TEXT_HASH_OPS: Oid = 1995;
pub const TID_BTREE_OPS: Oid = 2789;
