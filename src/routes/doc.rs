use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    audit::{AuditLog, AuditLogList},
    dto::{
        admin::{
            AdminList, AnnouncementList, CreateAdminRequest, CreateAnnouncementRequest, SettingList,
            UpdateAnnouncementRequest, UpdateSettingRequest,
        },
        auth::{LoginRequest, LoginResponse},
        cart::{AddToCartRequest, CartLine, CartSummary, ClearCartResult, UpdateCartItemRequest},
        coupons::{
            CouponList, CouponValidation, CreateCouponRequest, UpdateCouponRequest,
            ValidateCouponRequest,
        },
        orders::{
            CustomerInfo, OrderData, OrderLineInput, OrderList, OrderWithItems, StoreInfo,
            SubmitOrderRequest, SubmitOrderResponse,
        },
        products::{
            BrandList, CreateProductRequest, LowStockList, NewVariantRequest, ProductList,
            StockAdjustRequest, UpdateProductRequest, UpdateVariantRequest,
        },
    },
    models::{
        Admin, AdminRole, Announcement, CartItem, Coupon, DiscountType, Order, OrderItem, Product,
        ProductCategory, ProductVariant, ProductWithVariants, SystemSetting,
    },
    response::{ApiResponse, Meta},
    routes::{admin, announcements, auth, cart, coupons, health, orders, params, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        products::list_products,
        products::list_brands,
        products::get_product,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_cart_item,
        cart::clear_cart,
        coupons::validate_coupon,
        orders::submit_order,
        announcements::list_announcements,
        auth::login,
        admin::create_product,
        admin::update_product,
        admin::delete_product,
        admin::adjust_stock,
        admin::create_variant,
        admin::update_variant,
        admin::delete_variant,
        admin::adjust_variant_stock,
        admin::list_low_stock,
        admin::list_coupons,
        admin::create_coupon,
        admin::update_coupon,
        admin::delete_coupon,
        admin::list_orders,
        admin::get_order,
        admin::list_announcements,
        admin::create_announcement,
        admin::update_announcement,
        admin::delete_announcement,
        admin::list_settings,
        admin::upsert_setting,
        admin::list_admins,
        admin::create_admin,
        admin::delete_admin,
        admin::list_audit_logs
    ),
    components(
        schemas(
            ProductCategory,
            DiscountType,
            AdminRole,
            Product,
            ProductVariant,
            ProductWithVariants,
            CartItem,
            Coupon,
            Order,
            OrderItem,
            Announcement,
            SystemSetting,
            Admin,
            AuditLog,
            AuditLogList,
            ProductList,
            LowStockList,
            BrandList,
            CreateProductRequest,
            UpdateProductRequest,
            NewVariantRequest,
            UpdateVariantRequest,
            StockAdjustRequest,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartLine,
            CartSummary,
            ClearCartResult,
            ValidateCouponRequest,
            CouponValidation,
            CreateCouponRequest,
            UpdateCouponRequest,
            CouponList,
            SubmitOrderRequest,
            OrderData,
            CustomerInfo,
            StoreInfo,
            OrderLineInput,
            SubmitOrderResponse,
            OrderList,
            OrderWithItems,
            LoginRequest,
            LoginResponse,
            CreateAdminRequest,
            AdminList,
            CreateAnnouncementRequest,
            UpdateAnnouncementRequest,
            AnnouncementList,
            UpdateSettingRequest,
            SettingList,
            params::SortOrder,
            params::ProductSortBy,
            Meta,
            ApiResponse<ProductWithVariants>,
            ApiResponse<ProductList>,
            ApiResponse<CartSummary>,
            ApiResponse<CouponValidation>,
            ApiResponse<SubmitOrderResponse>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Anonymous session cart endpoints"),
        (name = "Coupons", description = "Coupon validation"),
        (name = "Orders", description = "Order submission"),
        (name = "Announcements", description = "Storefront announcements"),
        (name = "Auth", description = "Admin authentication"),
        (name = "Admin", description = "Back-office endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
